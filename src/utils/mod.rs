//! Small shared helpers

pub mod clock;
pub mod human_format;
pub mod url;

pub use clock::{Clock, ManualClock, SystemClock};
pub use human_format::{format_bytes, format_duration};
