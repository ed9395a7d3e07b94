//! Shared server state.

use std::sync::Arc;

use devpulse_storage::DeviceStore;

/// State handed to every handler.
#[derive(Clone)]
pub struct ServerState {
    /// The device store, shared with the ingestion pipeline.
    pub store: Arc<DeviceStore>,
    /// TCP ingestion port, echoed by the health probe.
    pub tcp_port: u16,
    /// HTTP port, echoed by the health probe.
    pub http_port: u16,
}

impl ServerState {
    pub fn new(store: Arc<DeviceStore>, tcp_port: u16, http_port: u16) -> Self {
        Self {
            store,
            tcp_port,
            http_port,
        }
    }
}
