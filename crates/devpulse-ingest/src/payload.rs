//! Inbound payload interpretation and device identity resolution.
//!
//! A single parse attempt classifies each trimmed chunk as either
//! [`Payload::Structured`] (well-formed JSON, with any recognized fields
//! pulled out) or [`Payload::Raw`] (anything else). One resolution function
//! then derives the device identity for either variant, so the two branches
//! cannot drift apart.

use std::net::SocketAddr;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// A classified inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Well-formed JSON. Recognized fields are extracted when the value is
    /// an object; any other JSON value carries no fields.
    Structured(StructuredFields),
    /// Not parseable as JSON. Accepted all the same, identified by the
    /// sending endpoint.
    Raw,
}

/// Optional device metadata pulled out of a structured payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredFields {
    /// First present of `device_id` | `id`.
    pub device_id: Option<String>,
    /// First present of `device_name` | `name`.
    pub device_name: Option<String>,
    /// First present of `device_type` | `type`.
    pub device_type: Option<String>,
}

impl Payload {
    /// Classify a trimmed payload with a single parse attempt.
    pub fn parse(trimmed: &str) -> Payload {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Payload::Structured(StructuredFields::from_value(&value)),
            Err(_) => Payload::Raw,
        }
    }

    /// Resolve the device identity for this payload.
    ///
    /// Structured payloads use their own id when they carry one; without an
    /// id every message gets a fresh time-based identity. Raw payloads
    /// collapse onto the sending endpoint instead, so unidentified devices
    /// still accumulate a single continuous history.
    pub fn resolve_identity(&self, peer: SocketAddr) -> ResolvedIdentity {
        match self {
            Payload::Structured(fields) => ResolvedIdentity {
                device_id: fields
                    .device_id
                    .clone()
                    .unwrap_or_else(|| format!("device_{}", Utc::now().timestamp_millis())),
                device_name: fields.device_name.clone(),
                device_type: fields.device_type.clone(),
                structured: true,
            },
            Payload::Raw => ResolvedIdentity {
                device_id: format!("device_{}_{}", peer.ip(), peer.port()),
                device_name: None,
                device_type: None,
                structured: false,
            },
        }
    }
}

impl StructuredFields {
    fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        Self {
            device_id: first_string(map, &["device_id", "id"]),
            device_name: first_string(map, &["device_name", "name"]),
            device_type: first_string(map, &["device_type", "type"]),
        }
    }
}

/// First of `keys` present in the object, as a string. Numeric values are
/// accepted and stringified since many devices send numeric ids.
fn first_string(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Device identity and metadata resolved from one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub device_id: String,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    /// Whether the payload took the structured path (reflected in the ack).
    pub structured: bool,
}

/// Acknowledgment written back on the connection, one line per payload.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub status: &'static str,
    pub message: &'static str,
    pub device_id: String,
    pub timestamp: String,
}

impl Ack {
    /// Successful ack; the message distinguishes the structured path from
    /// the raw fallback.
    pub fn success(device_id: String, structured: bool) -> Self {
        Self {
            status: "success",
            message: if structured {
                "Data received and stored"
            } else {
                "Data received and stored (non-JSON format)"
            },
            device_id,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
