mod session;
mod writer;

pub use session::{SessionInfo, SessionStatus};
pub use writer::{format_record, SessionRecorder, SESSION_STAMP_FORMAT};
