//! Device registry and telemetry log storage using redb.
//!
//! One [`DeviceStore`] owns the database. Device records are keyed by their
//! stable `device_id`; log rows are keyed by `(device_id, sequence)` so a
//! range scan over one device yields its history in insertion order.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

// Devices table: key = device_id, value = DeviceRecord (JSON)
const DEVICES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("devices");

// Data logs table: key = (device_id, sequence), value = LogEntry (JSON)
const DATA_LOGS_TABLE: TableDefinition<(&str, u64), &str> = TableDefinition::new("data_logs");

/// Name given to a device whose payloads never carried one.
pub const DEFAULT_DEVICE_NAME: &str = "Unknown Device";

/// Type given to a device whose payloads never carried one.
pub const DEFAULT_DEVICE_TYPE: &str = "Generic";

/// How long since last contact a device still counts as active.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(300);

/// Default number of log rows returned by [`DeviceStore::get_logs`].
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Device liveness status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Active => write!(f, "active"),
            DeviceStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(DeviceStatus::Active),
            "inactive" => Ok(DeviceStatus::Inactive),
            other => Err(Error::InvalidInput(format!(
                "Unknown device status: {}",
                other
            ))),
        }
    }
}

/// Persisted state for one logical device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable device identifier, unique across the store.
    pub device_id: String,
    /// Last-seen source address.
    pub ip_address: String,
    /// Last-seen source port.
    pub port: u16,
    /// Human-readable name, defaulted when the device never sent one.
    pub device_name: String,
    /// Device type, defaulted when the device never sent one.
    pub device_type: String,
    /// Liveness status as last persisted (the computed active view may
    /// disagree for a stale record the sweeper has not visited yet).
    pub status: DeviceStatus,
    /// Last contact time (unix millis). Non-decreasing per device.
    pub last_seen: i64,
    /// Creation time (unix millis). Immutable after creation.
    pub first_connected: i64,
    /// Most recent raw payload, verbatim.
    pub data: String,
}

/// One immutable historical payload received from a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Device the payload was attributed to.
    pub device_id: String,
    /// Receipt time (unix millis).
    pub timestamp: i64,
    /// Raw payload, verbatim.
    pub data: String,
}

/// Device counts for the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStats {
    pub total_devices: usize,
    pub active_devices: usize,
    pub inactive_devices: usize,
}

/// redb-backed store for device records and telemetry logs.
pub struct DeviceStore {
    db: Database,
    freshness_window: Duration,
    /// Log key sequence. Seeded past the highest persisted key at open so
    /// keys stay monotone across restarts; incremented per append so rows
    /// appended in the same instant still order totally.
    log_seq: AtomicU64,
}

impl DeviceStore {
    /// Open or create a store at the given path with the default freshness
    /// window.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Self::open_with_window(path, FRESHNESS_WINDOW)
    }

    /// Open or create a store with an explicit freshness window.
    pub fn open_with_window(path: impl AsRef<Path>, freshness_window: Duration) -> Result<Arc<Self>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };

        // Create both tables up front so later read transactions never
        // observe a missing table.
        let txn = db.begin_write()?;
        {
            txn.open_table(DEVICES_TABLE)?;
            txn.open_table(DATA_LOGS_TABLE)?;
        }
        txn.commit()?;

        // Resume the log sequence past the highest persisted key; the
        // clock only seeds a brand-new table. Trusting the clock on reopen
        // would collide with existing keys after clock skew.
        let read_txn = db.begin_read()?;
        let logs = read_txn.open_table(DATA_LOGS_TABLE)?;
        let mut next_seq = now_millis() as u64 * 1000;
        // Keys sort by device first, so the maximum sequence needs a scan.
        for entry in logs.iter()? {
            let (key, _) = entry?;
            next_seq = next_seq.max(key.value().1 + 1);
        }
        drop(logs);

        debug!(path = %path.display(), "device store opened");

        Ok(Arc::new(Self {
            db,
            freshness_window,
            log_seq: AtomicU64::new(next_seq),
        }))
    }

    /// Insert or update a device record.
    ///
    /// Creates the record on first contact. On update the transport endpoint
    /// and payload snapshot are overwritten unconditionally, name and type
    /// only when a new value is present, `last_seen` is bumped, and the
    /// status is forced back to active. Returns the resolved identity.
    pub fn upsert_device(
        &self,
        device_id: &str,
        ip_address: &str,
        port: u16,
        device_name: Option<&str>,
        device_type: Option<&str>,
        payload: &str,
    ) -> Result<String> {
        let now = now_millis();
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DEVICES_TABLE)?;

            let record = match table.get(device_id)? {
                Some(existing) => {
                    let mut record: DeviceRecord = serde_json::from_str(existing.value())?;
                    record.ip_address = ip_address.to_string();
                    record.port = port;
                    if let Some(name) = device_name {
                        record.device_name = name.to_string();
                    }
                    if let Some(ty) = device_type {
                        record.device_type = ty.to_string();
                    }
                    record.data = payload.to_string();
                    record.last_seen = record.last_seen.max(now);
                    record.status = DeviceStatus::Active;
                    record
                }
                None => DeviceRecord {
                    device_id: device_id.to_string(),
                    ip_address: ip_address.to_string(),
                    port,
                    device_name: device_name.unwrap_or(DEFAULT_DEVICE_NAME).to_string(),
                    device_type: device_type.unwrap_or(DEFAULT_DEVICE_TYPE).to_string(),
                    status: DeviceStatus::Active,
                    last_seen: now,
                    first_connected: now,
                    data: payload.to_string(),
                },
            };

            let json = serde_json::to_string(&record)?;
            table.insert(device_id, json.as_str())?;
        }
        txn.commit()?;

        Ok(device_id.to_string())
    }

    /// Append an immutable log row for a device, stamped with the current
    /// time.
    pub fn append_log(&self, device_id: &str, payload: &str) -> Result<LogEntry> {
        let entry = LogEntry {
            device_id: device_id.to_string(),
            timestamp: now_millis(),
            data: payload.to_string(),
        };
        let seq = self.log_seq.fetch_add(1, Ordering::Relaxed);

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DATA_LOGS_TABLE)?;
            let json = serde_json::to_string(&entry)?;
            table.insert((device_id, seq), json.as_str())?;
        }
        txn.commit()?;

        Ok(entry)
    }

    /// All device records, most recently seen first.
    pub fn list_all(&self) -> Result<Vec<DeviceRecord>> {
        let mut devices = self.read_all_devices()?;
        devices.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        Ok(devices)
    }

    /// Device records that are both flagged active and fresh.
    ///
    /// Freshness is recomputed against `last_seen` here rather than trusted
    /// from the persisted flag, so a stale record the sweeper has not yet
    /// visited is excluded.
    pub fn list_active(&self) -> Result<Vec<DeviceRecord>> {
        let cutoff = now_millis() - self.freshness_window.as_millis() as i64;
        let mut devices = self.list_all()?;
        devices.retain(|d| d.status == DeviceStatus::Active && d.last_seen >= cutoff);
        Ok(devices)
    }

    /// Look up one device by identity.
    pub fn get_by_id(&self, device_id: &str) -> Result<Option<DeviceRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DEVICES_TABLE)?;
        match table.get(device_id)? {
            Some(value) => Ok(Some(serde_json::from_str(value.value())?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` most recent log rows for a device, newest first.
    pub fn get_logs(&self, device_id: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DATA_LOGS_TABLE)?;

        let mut logs = Vec::new();
        for row in table
            .range((device_id, u64::MIN)..=(device_id, u64::MAX))?
            .rev()
        {
            if logs.len() >= limit {
                break;
            }
            let (_, value) = row?;
            logs.push(serde_json::from_str(value.value())?);
        }
        Ok(logs)
    }

    /// Unconditionally overwrite a device's status. Returns the number of
    /// records affected (0 when the device is unknown).
    pub fn set_status(&self, device_id: &str, status: DeviceStatus) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let affected = {
            let mut table = txn.open_table(DEVICES_TABLE)?;
            let record = match table.get(device_id)? {
                Some(existing) => {
                    let mut record: DeviceRecord = serde_json::from_str(existing.value())?;
                    record.status = status;
                    Some(record)
                }
                None => None,
            };
            match record {
                Some(record) => {
                    let json = serde_json::to_string(&record)?;
                    table.insert(device_id, json.as_str())?;
                    1
                }
                None => 0,
            }
        };
        txn.commit()?;
        Ok(affected)
    }

    /// Transition every active-but-stale device to inactive. Returns the
    /// number of records affected; idempotent when nothing newly went stale.
    pub fn sweep_inactive(&self) -> Result<usize> {
        let cutoff = now_millis() - self.freshness_window.as_millis() as i64;

        let txn = self.db.begin_write()?;
        let affected = {
            let mut table = txn.open_table(DEVICES_TABLE)?;

            let mut stale = Vec::new();
            for row in table.iter()? {
                let (key, value) = row?;
                let record: DeviceRecord = serde_json::from_str(value.value())?;
                if record.status == DeviceStatus::Active && record.last_seen < cutoff {
                    stale.push((key.value().to_string(), record));
                }
            }

            let count = stale.len();
            for (device_id, mut record) in stale {
                record.status = DeviceStatus::Inactive;
                let json = serde_json::to_string(&record)?;
                table.insert(device_id.as_str(), json.as_str())?;
            }
            count
        };
        txn.commit()?;

        if affected > 0 {
            debug!(affected, "swept stale devices to inactive");
        }
        Ok(affected)
    }

    /// Device counts: total, computed-active, and the remainder.
    pub fn stats(&self) -> Result<DeviceStats> {
        let total = self.read_all_devices()?.len();
        let active = self.list_active()?.len();
        Ok(DeviceStats {
            total_devices: total,
            active_devices: active,
            inactive_devices: total - active,
        })
    }

    fn read_all_devices(&self) -> Result<Vec<DeviceRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DEVICES_TABLE)?;
        let mut devices = Vec::new();
        for row in table.iter()? {
            let (_, value) = row?;
            devices.push(serde_json::from_str(value.value())?);
        }
        Ok(devices)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn temp_store() -> (Arc<DeviceStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceStore::open(dir.path().join("devpulse.redb")).unwrap();
        (store, dir)
    }

    fn zero_window_store() -> (Arc<DeviceStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            DeviceStore::open_with_window(dir.path().join("devpulse.redb"), Duration::ZERO)
                .unwrap();
        (store, dir)
    }

    #[test]
    fn test_upsert_creates_then_updates_one_record() {
        let (store, _dir) = temp_store();

        store
            .upsert_device("dev-1", "10.0.0.5", 5555, Some("Sensor A"), None, "{}")
            .unwrap();
        store
            .upsert_device("dev-1", "10.0.0.6", 5556, None, Some("Temp"), "{}")
            .unwrap();

        let devices = store.list_all().unwrap();
        assert_eq!(devices.len(), 1);

        let record = &devices[0];
        assert_eq!(record.device_id, "dev-1");
        assert_eq!(record.ip_address, "10.0.0.6");
        assert_eq!(record.port, 5556);
        // Name survives an update that carried none; type was merged in.
        assert_eq!(record.device_name, "Sensor A");
        assert_eq!(record.device_type, "Temp");
    }

    #[test]
    fn test_upsert_defaults_applied_at_creation() {
        let (store, _dir) = temp_store();

        store
            .upsert_device("dev-1", "10.0.0.5", 5555, None, None, "hello")
            .unwrap();

        let record = store.get_by_id("dev-1").unwrap().unwrap();
        assert_eq!(record.device_name, DEFAULT_DEVICE_NAME);
        assert_eq!(record.device_type, DEFAULT_DEVICE_TYPE);
        assert_eq!(record.status, DeviceStatus::Active);
        assert_eq!(record.data, "hello");
        assert_eq!(record.first_connected, record.last_seen);
    }

    #[test]
    fn test_upsert_reactivates_inactive_device() {
        let (store, _dir) = temp_store();

        store
            .upsert_device("dev-1", "10.0.0.5", 5555, None, None, "a")
            .unwrap();
        assert_eq!(store.set_status("dev-1", DeviceStatus::Inactive).unwrap(), 1);
        assert_eq!(
            store.get_by_id("dev-1").unwrap().unwrap().status,
            DeviceStatus::Inactive
        );

        store
            .upsert_device("dev-1", "10.0.0.5", 5555, None, None, "b")
            .unwrap();
        assert_eq!(
            store.get_by_id("dev-1").unwrap().unwrap().status,
            DeviceStatus::Active
        );
    }

    #[test]
    fn test_set_status_unknown_device_affects_zero() {
        let (store, _dir) = temp_store();
        assert_eq!(store.set_status("missing", DeviceStatus::Inactive).unwrap(), 0);
    }

    #[test]
    fn test_first_connected_immutable_and_last_seen_monotone() {
        let (store, _dir) = temp_store();

        store
            .upsert_device("dev-1", "10.0.0.5", 5555, None, None, "a")
            .unwrap();
        let created = store.get_by_id("dev-1").unwrap().unwrap();

        sleep(Duration::from_millis(5));
        store
            .upsert_device("dev-1", "10.0.0.5", 5555, None, None, "b")
            .unwrap();
        let updated = store.get_by_id("dev-1").unwrap().unwrap();

        assert_eq!(updated.first_connected, created.first_connected);
        assert!(updated.last_seen >= created.last_seen);
    }

    #[test]
    fn test_get_logs_newest_first_with_limit() {
        let (store, _dir) = temp_store();

        for i in 0..5 {
            store.append_log("dev-1", &format!("payload-{}", i)).unwrap();
        }
        store.append_log("dev-2", "other").unwrap();

        let logs = store.get_logs("dev-1", 3).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].data, "payload-4");
        assert_eq!(logs[1].data, "payload-3");
        assert_eq!(logs[2].data, "payload-2");
        assert!(logs.iter().all(|l| l.device_id == "dev-1"));

        assert!(store.get_logs("dev-3", 10).unwrap().is_empty());
    }

    #[test]
    fn test_list_all_ordered_by_last_seen_desc() {
        let (store, _dir) = temp_store();

        store
            .upsert_device("dev-1", "10.0.0.5", 1, None, None, "a")
            .unwrap();
        sleep(Duration::from_millis(5));
        store
            .upsert_device("dev-2", "10.0.0.5", 2, None, None, "b")
            .unwrap();

        let devices = store.list_all().unwrap();
        assert_eq!(devices[0].device_id, "dev-2");
        assert_eq!(devices[1].device_id, "dev-1");
    }

    #[test]
    fn test_list_active_recomputes_freshness() {
        let (store, _dir) = zero_window_store();

        store
            .upsert_device("dev-1", "10.0.0.5", 5555, None, None, "a")
            .unwrap();
        sleep(Duration::from_millis(5));

        // Persisted flag still says active, but the record is stale.
        let record = store.get_by_id("dev-1").unwrap().unwrap();
        assert_eq!(record.status, DeviceStatus::Active);
        assert!(store.list_active().unwrap().is_empty());
    }

    #[test]
    fn test_sweep_inactive_is_idempotent() {
        let (store, _dir) = zero_window_store();

        store
            .upsert_device("dev-1", "10.0.0.5", 5555, None, None, "a")
            .unwrap();
        store
            .upsert_device("dev-2", "10.0.0.5", 5556, None, None, "b")
            .unwrap();
        sleep(Duration::from_millis(5));

        assert_eq!(store.sweep_inactive().unwrap(), 2);
        assert_eq!(
            store.get_by_id("dev-1").unwrap().unwrap().status,
            DeviceStatus::Inactive
        );

        // Nothing newly stale: the second pass affects zero records.
        assert_eq!(store.sweep_inactive().unwrap(), 0);
    }

    #[test]
    fn test_stats_counts() {
        let (store, _dir) = zero_window_store();

        store
            .upsert_device("dev-1", "10.0.0.5", 5555, None, None, "a")
            .unwrap();
        sleep(Duration::from_millis(5));

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_devices, 1);
        assert_eq!(stats.active_devices, 0);
        assert_eq!(stats.inactive_devices, 1);
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        assert_eq!("active".parse::<DeviceStatus>().unwrap(), DeviceStatus::Active);
        assert_eq!(
            "inactive".parse::<DeviceStatus>().unwrap(),
            DeviceStatus::Inactive
        );
        assert!("online".parse::<DeviceStatus>().is_err());
        assert_eq!(DeviceStatus::Active.to_string(), "active");
    }

    #[test]
    fn test_reopen_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devpulse.redb");

        {
            let store = DeviceStore::open(&path).unwrap();
            store
                .upsert_device("dev-1", "10.0.0.5", 5555, Some("Sensor A"), None, "a")
                .unwrap();
            store.append_log("dev-1", "a").unwrap();
        }

        let store = DeviceStore::open(&path).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 1);
        assert_eq!(store.get_logs("dev-1", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_log_sequence_resumes_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devpulse.redb");

        {
            let store = DeviceStore::open(&path).unwrap();
            for data in ["a", "b", "c"] {
                store.append_log("dev-1", data).unwrap();
            }
        }

        // Rows appended after a reopen must extend the log, never land on
        // existing keys.
        let store = DeviceStore::open(&path).unwrap();
        for data in ["d", "e", "f"] {
            store.append_log("dev-1", data).unwrap();
        }

        let logs = store.get_logs("dev-1", 10).unwrap();
        assert_eq!(logs.len(), 6);
        let data: Vec<&str> = logs.iter().map(|l| l.data.as_str()).collect();
        assert_eq!(data, vec!["f", "e", "d", "c", "b", "a"]);
    }
}
