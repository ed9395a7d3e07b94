//! Device registry logic: one inbound chunk in, one device upsert plus one
//! log row out.

use std::net::SocketAddr;
use std::sync::Arc;

use devpulse_storage::{DeviceStore, LogEntry};
use tracing::debug;

use crate::payload::{Ack, Payload};
use crate::Result;

/// Storage operations the ingestion path depends on.
///
/// [`DeviceStore`] is the production implementation; tests substitute
/// failing stores to drive the error-acknowledgment path.
pub trait IngestStore: Send + Sync {
    /// Insert or update a device record; returns the resolved identity.
    fn upsert_device(
        &self,
        device_id: &str,
        ip_address: &str,
        port: u16,
        device_name: Option<&str>,
        device_type: Option<&str>,
        payload: &str,
    ) -> devpulse_storage::Result<String>;

    /// Append an immutable log row for a device.
    fn append_log(&self, device_id: &str, payload: &str) -> devpulse_storage::Result<LogEntry>;
}

impl IngestStore for DeviceStore {
    fn upsert_device(
        &self,
        device_id: &str,
        ip_address: &str,
        port: u16,
        device_name: Option<&str>,
        device_type: Option<&str>,
        payload: &str,
    ) -> devpulse_storage::Result<String> {
        DeviceStore::upsert_device(
            self,
            device_id,
            ip_address,
            port,
            device_name,
            device_type,
            payload,
        )
    }

    fn append_log(&self, device_id: &str, payload: &str) -> devpulse_storage::Result<LogEntry> {
        DeviceStore::append_log(self, device_id, payload)
    }
}

/// Interprets inbound payloads and normalizes them into store updates.
pub struct DeviceRegistry {
    store: Arc<dyn IngestStore>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn IngestStore>) -> Self {
        Self { store }
    }

    /// Process one payload chunk from a connection.
    ///
    /// Trims the chunk, resolves the device identity, upserts the device
    /// record, appends a log row, and returns the acknowledgment to write
    /// back. Malformed payloads are not errors; only storage failures
    /// surface here.
    pub fn ingest(&self, chunk: &[u8], peer: SocketAddr) -> Result<Ack> {
        let raw = String::from_utf8_lossy(chunk);
        let trimmed = raw.trim();

        let payload = Payload::parse(trimmed);
        let identity = payload.resolve_identity(peer);

        debug!(
            device_id = %identity.device_id,
            structured = identity.structured,
            len = trimmed.len(),
            "ingesting payload"
        );

        self.store.upsert_device(
            &identity.device_id,
            &peer.ip().to_string(),
            peer.port(),
            identity.device_name.as_deref(),
            identity.device_type.as_deref(),
            trimmed,
        )?;
        self.store.append_log(&identity.device_id, trimmed)?;

        Ok(Ack::success(identity.device_id, identity.structured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devpulse_storage::{DeviceStatus, DEFAULT_DEVICE_NAME, DEFAULT_DEVICE_TYPE};

    fn temp_registry() -> (DeviceRegistry, Arc<DeviceStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceStore::open(dir.path().join("devpulse.redb")).unwrap();
        (DeviceRegistry::new(store.clone()), store, dir)
    }

    fn peer() -> SocketAddr {
        "10.0.0.5:5555".parse().unwrap()
    }

    #[test]
    fn test_structured_chunk_creates_device_and_log() {
        let (registry, store, _dir) = temp_registry();

        let ack = registry
            .ingest(br#"{"id":"dev-1","name":"Sensor A"}"#, peer())
            .unwrap();
        assert_eq!(ack.status, "success");
        assert_eq!(ack.device_id, "dev-1");

        let record = store.get_by_id("dev-1").unwrap().unwrap();
        assert_eq!(record.device_name, "Sensor A");
        assert_eq!(record.device_type, DEFAULT_DEVICE_TYPE);
        assert_eq!(record.ip_address, "10.0.0.5");
        assert_eq!(record.port, 5555);

        let logs = store.get_logs("dev-1", 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].data, r#"{"id":"dev-1","name":"Sensor A"}"#);
    }

    #[test]
    fn test_raw_chunk_uses_endpoint_identity() {
        let (registry, store, _dir) = temp_registry();

        let ack = registry.ingest(b"hello", peer()).unwrap();
        assert_eq!(ack.device_id, "device_10.0.0.5_5555");

        let record = store.get_by_id("device_10.0.0.5_5555").unwrap().unwrap();
        assert_eq!(record.device_name, DEFAULT_DEVICE_NAME);
        assert_eq!(record.device_type, DEFAULT_DEVICE_TYPE);
        assert_eq!(record.data, "hello");
    }

    #[test]
    fn test_repeated_chunks_keep_one_record() {
        let (registry, store, _dir) = temp_registry();

        for _ in 0..3 {
            registry.ingest(br#"{"id":"dev-1"}"#, peer()).unwrap();
        }

        assert_eq!(store.list_all().unwrap().len(), 1);
        assert_eq!(store.get_logs("dev-1", 10).unwrap().len(), 3);
    }

    #[test]
    fn test_metadata_merges_across_chunks() {
        let (registry, store, _dir) = temp_registry();

        registry
            .ingest(br#"{"id":"dev-1","name":"Sensor A"}"#, peer())
            .unwrap();
        registry
            .ingest(br#"{"id":"dev-1","type":"Temp"}"#, peer())
            .unwrap();

        let record = store.get_by_id("dev-1").unwrap().unwrap();
        assert_eq!(record.device_name, "Sensor A");
        assert_eq!(record.device_type, "Temp");
    }

    #[test]
    fn test_chunk_reactivates_swept_device() {
        let (registry, store, _dir) = temp_registry();

        registry.ingest(br#"{"id":"dev-1"}"#, peer()).unwrap();
        store.set_status("dev-1", DeviceStatus::Inactive).unwrap();

        registry.ingest(br#"{"id":"dev-1"}"#, peer()).unwrap();
        assert_eq!(
            store.get_by_id("dev-1").unwrap().unwrap().status,
            DeviceStatus::Active
        );
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let (registry, store, _dir) = temp_registry();

        registry.ingest(b"  {\"id\":\"dev-1\"}\n", peer()).unwrap();

        let logs = store.get_logs("dev-1", 10).unwrap();
        assert_eq!(logs[0].data, r#"{"id":"dev-1"}"#);
    }

    struct FailingStore;

    impl IngestStore for FailingStore {
        fn upsert_device(
            &self,
            _device_id: &str,
            _ip_address: &str,
            _port: u16,
            _device_name: Option<&str>,
            _device_type: Option<&str>,
            _payload: &str,
        ) -> devpulse_storage::Result<String> {
            Err(devpulse_storage::Error::Storage("store unavailable".into()))
        }

        fn append_log(
            &self,
            _device_id: &str,
            _payload: &str,
        ) -> devpulse_storage::Result<LogEntry> {
            Err(devpulse_storage::Error::Storage("store unavailable".into()))
        }
    }

    #[test]
    fn test_storage_failure_surfaces_as_error() {
        let registry = DeviceRegistry::new(Arc::new(FailingStore));
        assert!(registry.ingest(br#"{"id":"dev-1"}"#, peer()).is_err());
    }
}
