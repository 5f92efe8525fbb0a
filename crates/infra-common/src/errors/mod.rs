//! Error types for infrastructure components

pub mod types;
