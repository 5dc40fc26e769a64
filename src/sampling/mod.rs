mod sample;
mod trend;
mod window;

pub use sample::{RawSample, SAMPLE_FIELD_COUNT};
pub use trend::{TrendBuffer, TrendPoint};
pub use window::{SampleWindow, DEFAULT_WINDOW_CAPACITY};
