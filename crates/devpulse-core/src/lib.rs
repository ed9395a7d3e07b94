//! Shared configuration and error types for DevPulse.
//!
//! Everything here is consumed by the other workspace crates: the layered
//! configuration (defaults, TOML file, environment overrides) and the
//! top-level error type that crate-local errors convert into.

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
