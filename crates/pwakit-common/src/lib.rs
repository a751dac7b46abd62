//! # PWAKit Common
//!
//! Shared utilities and logging configuration for the PWAKit offline worker.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Epoch timestamp helpers

pub mod logging;
pub mod time;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use time::epoch_millis;
