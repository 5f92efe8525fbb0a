//! # Infra-Common
//!
//! Infrastructure shared by every crate in the rental client workspace:
//!
//! - [`logging`] - `tracing` subscriber bootstrap
//! - [`errors`] - error type for infrastructure failures

pub mod errors;
pub mod logging;

pub use errors::types::{Error, Result};
pub use logging::setup::{log_welcome, parse_log_level, setup_logging, LogFormat, LoggingConfig};
