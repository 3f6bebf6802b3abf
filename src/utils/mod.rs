pub mod error;
pub mod filesystem;
pub mod logging;
pub mod process;

pub use error::{Error, Result};
pub use filesystem::format_file_size;
pub use logging::{setup_logging, LoggingGuards};
pub use process::{ProcessRunner, RunOutcome, DEFAULT_MIN_OUTPUT_BYTES};
