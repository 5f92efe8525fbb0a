//! Logging bootstrap built on `tracing-subscriber`

pub mod setup;
