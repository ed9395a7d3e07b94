//! Device telemetry ingestion over raw TCP.
//!
//! The pipeline: the [`server::IngestServer`] accepts connections and runs
//! one handler task per client; each inbound chunk goes through
//! [`registry::DeviceRegistry`], which interprets the payload
//! ([`payload::Payload`]), resolves a device identity, upserts the device
//! record, appends a log row, and produces the acknowledgment written back
//! on the same connection. The [`sweeper::LivenessSweeper`] runs alongside
//! and retires devices that stop reporting.

pub mod error;
pub mod payload;
pub mod registry;
pub mod server;
pub mod sweeper;

pub use error::{Error, Result};
pub use payload::{Ack, Payload, ResolvedIdentity};
pub use registry::{DeviceRegistry, IngestStore};
pub use server::{IngestServer, IngestServerConfig};
pub use sweeper::LivenessSweeper;
