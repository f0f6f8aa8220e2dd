//! Wire payload for lifecycle-event topics and the deterministic per-event
//! partition key derived from a service id.

use uuid::Uuid;

/// Arbitrary fixed namespace for deriving name-based (v5) UUIDs from
/// non-UUID service ids. Any stable namespace works; this one is private
/// to the broker's own event keys.
const SERVICE_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x2a, 0x8a, 0x10, 0x3e, 0x4b, 0x4b, 0x8e, 0x9c, 0x77, 0x2c, 0x5d, 0x3a, 0x91, 0x0e, 0x44,
]);

/// A length-delimited, schema-registry-aware encoded message published to
/// one of the four lifecycle topics.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LifecycleEventPayload {
    #[prost(string, tag = "1")]
    pub service_id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(int64, tag = "3")]
    pub timestamp_unix_millis: i64,
}

/// Derive the stable per-instance partition key for `service_id`: itself
/// verbatim if already a well-formed UUID, else a name-based UUID derived
/// from its UTF-8 bytes.
#[must_use]
pub fn event_key(service_id: &str) -> String {
    match Uuid::parse_str(service_id) {
        Ok(uuid) => uuid.to_string(),
        Err(_) => Uuid::new_v5(&SERVICE_ID_NAMESPACE, service_id.as_bytes()).to_string(),
    }
}
