//! Core data structures shared across the Hermes node.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// JSON field injected into every submission before mapping: the generated event UUID.
pub const EVENT_UUID_FIELD: &str = "UUID";
/// JSON field injected into every submission before mapping: the event type name.
pub const EVENT_TYPE_FIELD: &str = "eventType";
/// JSON field injected into every submission before mapping: epoch seconds at enrichment.
pub const EVENT_RECORDED_FIELD: &str = "recordedTime";

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// A registered event type: the mapping/validation documents and retention policy
/// that govern every submission carrying its name.
///
/// Identity is the `name`. The registration invariants (minimal mapping present and
/// UUID placeholder in both mapping docs when `minimize` is set) are enforced by the
/// [`crate::event::types::EventTypeRegistry`], not per event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventType {
    pub name: String,
    /// Full JSON→RDF mapping document.
    pub mapping: String,
    /// Smaller mapping document used for peer transmission when `minimize` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal_mapping: Option<String>,
    /// Shape document the mapped RDF must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    /// JSON-Schema the raw submission must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// When set, peers receive the minimal RDF and may later request the full event.
    #[serde(default)]
    pub minimize: bool,
    /// Retention in days. `None` keeps events forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u64>,
}

impl EventType {
    pub fn new(name: impl Into<String>, mapping: impl Into<String>) -> Self {
        EventType {
            name: name.into(),
            mapping: mapping.into(),
            minimal_mapping: None,
            shape: None,
            schema: None,
            minimize: false,
            retention_days: None,
        }
    }
}

/// The result of running a submission through the enrichment pipeline.
///
/// Ephemeral: built per submission, consumed by distribution, then discarded.
/// Only its encoded projection persists on the ledger.
#[derive(Debug, Clone)]
pub struct EnrichedEvent {
    /// The submission with the three injected fields, pretty-printed.
    pub event_json: String,
    pub event_type: EventType,
    pub event_uuid: Uuid,
    /// Full RDF with all blank nodes rewritten to event-scoped IRIs.
    pub event_rdf: String,
    /// Present when the event type minimizes for peer transmission.
    pub minimized_rdf: Option<String>,
    pub recorded_time: u64,
}

/// In-process notification pushed from the publication observer to the webhook notifier.
///
/// The RDF rides along for in-process consumers but is not serialized to callbacks;
/// subscribers fetch the event through the API instead.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotification {
    pub event_type: String,
    #[serde(skip_serializing)]
    pub event_rdf: String,
    #[serde(rename = "eventUUID")]
    pub event_uuid: Uuid,
}
