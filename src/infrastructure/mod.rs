//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging (tracing-subscriber, tracing-appender)
//!
//! Store adapters live in `crate::adapters`.

pub mod config;
pub mod logging;
