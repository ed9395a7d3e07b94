//! API handlers organized by domain.

pub mod basic;
pub mod common;
pub mod devices;
pub mod stats;

// Re-export ServerState so handlers can use it
pub use crate::server::ServerState;

pub use basic::health_handler;
pub use devices::{
    get_device_handler, get_device_logs_handler, list_active_devices_handler,
    list_devices_handler, update_device_status_handler,
};
pub use stats::get_stats_handler;
