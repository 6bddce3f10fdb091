pub mod format;
pub mod retry;

pub use format::{MB, format_bytes, format_duration};
