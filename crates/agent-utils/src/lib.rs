//! Shared utilities for the trading-analysis workspace
//!
//! This crate provides logging setup and environment-driven configuration
//! used by the library and binary crates.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigError};
pub use logging::{init_tracing, init_tracing_with};
