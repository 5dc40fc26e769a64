fn main() {
    if let Err(err) = phmeter_lib::run() {
        eprintln!("phmeter: {err:#}");
        std::process::exit(1);
    }
}
