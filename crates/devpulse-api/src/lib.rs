//! HTTP API for DevPulse.
//!
//! A read/update veneer over the device store: device listings, per-device
//! logs, status updates, and aggregate stats, plus a health probe that
//! echoes the configured ports.

pub mod handlers;
pub mod server;

pub use server::{create_router_with_state, run, ServerState};
