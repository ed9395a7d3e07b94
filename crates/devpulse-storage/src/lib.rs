//! Persistent device and telemetry-log storage for DevPulse.
//!
//! Two logical tables live in a single redb database: `devices` (one record
//! per device identity, insert-or-update) and `data_logs` (append-only raw
//! payload history). All writes go through single atomic transactions, so
//! concurrent writers to the same device identity resolve last-write-wins
//! without read-modify-write races.

pub mod error;
pub mod store;

pub use error::{Error, Result};
pub use store::{
    DeviceRecord, DeviceStats, DeviceStatus, DeviceStore, LogEntry, DEFAULT_DEVICE_NAME,
    DEFAULT_DEVICE_TYPE, DEFAULT_LOG_LIMIT, FRESHNESS_WINDOW,
};
