//! Utility modules.

pub mod file;
pub mod retry;

pub use file::{DocumentFormat, MAX_FILE_SIZE, calculate_checksum, collect_files, read_text_file};
pub use retry::{RetryConfig, Retryable, with_retry};
