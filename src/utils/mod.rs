//! Small shared helpers

pub mod atomic_file;
pub mod human_format;
pub mod jitter;

pub use atomic_file::write_atomic;
pub use human_format::format_bytes;
pub use jitter::generate_jitter_percent;
