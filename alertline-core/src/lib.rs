//! Core shared library for the alertline workspace.
//!
//! This crate exposes the primitives every other member depends on: the
//! canonical error type, environment configuration loading, serde helpers
//! for rule/metric documents and the tracing setup used by the binaries.

pub mod config;
pub mod errors;
pub mod logging;
pub mod serde_utils;

pub use config::{CoreConfig, Environment};
pub use errors::{ConfigError, CoreError, Result as CoreResult};
