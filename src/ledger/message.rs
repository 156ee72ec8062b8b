//! Ledger message types and the peer wire envelope.
//!
//! A ledger row records one message in one direction. The opaque `payload` column is
//! base64 of the inner content JSON and decodes into a tagged variant keyed by the
//! message type, rather than one struct with many optional fields.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

pub const DESTINATION_SEPARATOR: &str = ";";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Created,
    Send,
    Failed,
    Refused,
    Received,
    Forwarded,
    Invalid,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MessageStatus::Created => "created",
            MessageStatus::Send => "send",
            MessageStatus::Failed => "failed",
            MessageStatus::Refused => "refused",
            MessageStatus::Received => "received",
            MessageStatus::Forwarded => "forwarded",
            MessageStatus::Invalid => "invalid",
        };
        write!(f, "{}", label)
    }
}

/// Viewer buckets over the status column.
pub const INCOMING_STATUSES: &[MessageStatus] =
    &[MessageStatus::Received, MessageStatus::Forwarded];
pub const OUTGOING_STATUSES: &[MessageStatus] = &[MessageStatus::Send];
pub const FAILED_STATUSES: &[MessageStatus] = &[
    MessageStatus::Created,
    MessageStatus::Invalid,
    MessageStatus::Failed,
    MessageStatus::Refused,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "event")]
    Event,
    #[serde(rename = "fullevent")]
    FullEventRequest,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Event => write!(f, "event"),
            MessageType::FullEventRequest => write!(f, "fullevent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionMode {
    Static,
    Broadcast,
}

/// Inner content of an `event` message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventContent {
    #[serde(rename = "eventUUID")]
    pub event_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(rename = "eventRDF", default, skip_serializing_if = "Option::is_none")]
    pub event_rdf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_recorded: Option<u64>,
}

/// Inner content of a `fullevent` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullEventRequestContent {
    #[serde(rename = "eventUUID")]
    pub event_uuid: Uuid,
}

/// Decoded form of a ledger row's opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Event(EventContent),
    FullEventRequest(FullEventRequestContent),
}

#[derive(Debug)]
pub enum PayloadCodecError {
    Base64(String),
    Json(String),
}

impl fmt::Display for PayloadCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadCodecError::Base64(msg) => write!(f, "Payload base64 error: {}", msg),
            PayloadCodecError::Json(msg) => write!(f, "Payload JSON error: {}", msg),
        }
    }
}

impl std::error::Error for PayloadCodecError {}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::Event(_) => MessageType::Event,
            MessagePayload::FullEventRequest(_) => MessageType::FullEventRequest,
        }
    }

    /// Base64 of the inner content JSON, the form stored on the row and shipped on the wire.
    pub fn encode(&self) -> String {
        let json = match self {
            MessagePayload::Event(content) => serde_json::to_string(content),
            MessagePayload::FullEventRequest(content) => serde_json::to_string(content),
        }
        .expect("payload serialization cannot fail");
        BASE64.encode(json.as_bytes())
    }

    pub fn decode(
        message_type: MessageType,
        encoded: &str,
    ) -> Result<MessagePayload, PayloadCodecError> {
        let bytes =
            BASE64.decode(encoded).map_err(|e| PayloadCodecError::Base64(e.to_string()))?;
        match message_type {
            MessageType::Event => serde_json::from_slice(&bytes)
                .map(MessagePayload::Event)
                .map_err(|e| PayloadCodecError::Json(e.to_string())),
            MessageType::FullEventRequest => serde_json::from_slice(&bytes)
                .map(MessagePayload::FullEventRequest)
                .map_err(|e| PayloadCodecError::Json(e.to_string())),
        }
    }
}

/// One durable ledger row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerMessage {
    /// Store-assigned surrogate id; 0 until inserted.
    pub id: u64,
    pub recorded_time: u64,
    pub status: MessageStatus,
    /// Stable correlation key, globally unique.
    pub message_id: Uuid,
    pub message_type: MessageType,
    /// Sender identity; inbound rows only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// ';'-separated destination identities; outbound rows only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destinations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_mode: Option<DistributionMode>,
    /// Opaque payload, base64 of the inner content JSON.
    pub payload: String,
    /// Outbound rows only; needed to rebuild a full event later.
    #[serde(skip)]
    pub original_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl LedgerMessage {
    /// Build an outbound row in the CREATED state. Empty destinations select broadcast mode.
    pub fn outbound(
        recorded_time: u64,
        destinations: &BTreeSet<String>,
        payload: &MessagePayload,
        message_id: Uuid,
        original_json: Option<String>,
        event_type: Option<String>,
    ) -> Self {
        let distribution_mode = if destinations.is_empty() {
            DistributionMode::Broadcast
        } else {
            DistributionMode::Static
        };
        LedgerMessage {
            id: 0,
            recorded_time,
            status: MessageStatus::Created,
            message_id,
            message_type: payload.message_type(),
            origin: None,
            destinations: Some(
                destinations.iter().cloned().collect::<Vec<_>>().join(DESTINATION_SEPARATOR),
            ),
            distribution_mode: Some(distribution_mode),
            payload: payload.encode(),
            original_json,
            event_type,
        }
    }

    /// Build an inbound row in the RECEIVED state from a peer envelope.
    pub fn inbound(envelope: &PeerEnvelope, recorded_time: u64, event_type: Option<String>) -> Self {
        LedgerMessage {
            id: 0,
            recorded_time,
            status: MessageStatus::Received,
            message_id: envelope.message_id,
            message_type: envelope.message_type,
            origin: envelope.origin.clone(),
            destinations: None,
            distribution_mode: None,
            payload: envelope.message.clone(),
            original_json: None,
            event_type,
        }
    }

    pub fn decoded_payload(&self) -> Result<MessagePayload, PayloadCodecError> {
        MessagePayload::decode(self.message_type, &self.payload)
    }

    /// Whether the row's destination set contains the given peer identity.
    pub fn has_destination(&self, peer: &str) -> bool {
        self.destinations
            .as_deref()
            .map(|joined| joined.split(DESTINATION_SEPARATOR).any(|d| d == peer))
            .unwrap_or(false)
    }

    /// Project the row onto the peer wire envelope.
    pub fn to_envelope(&self) -> PeerEnvelope {
        PeerEnvelope {
            recorded_time: Some(self.recorded_time),
            message_id: self.message_id,
            message_type: self.message_type,
            message: self.payload.clone(),
            origin: None,
            destination: self.destinations.clone(),
        }
    }
}

/// The JSON envelope POSTed to a peer message endpoint.
///
/// `origin` is set by the sender's relay on inbound traffic; `destination` is the
/// ';'-separated identity list on outbound traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_time: Option<u64>,
    pub message_id: Uuid,
    pub message_type: MessageType,
    /// base64 of the inner content JSON.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip() {
        let payload = MessagePayload::Event(EventContent {
            event_uuid: Uuid::new_v4(),
            event_type: Some("test.v1".to_string()),
            event_rdf: Some("<http://ex/s> <http://ex/p> \"o\" .".to_string()),
            event_recorded: Some(1_700_000_000),
        });
        let encoded = payload.encode();
        let decoded = MessagePayload::decode(MessageType::Event, &encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn envelope_uses_wire_field_names() {
        let payload =
            MessagePayload::FullEventRequest(FullEventRequestContent { event_uuid: Uuid::nil() });
        let destinations: BTreeSet<String> =
            ["O=A,L=X,C=NL".to_string(), "O=B,L=Y,C=DE".to_string()].into();
        let row =
            LedgerMessage::outbound(42, &destinations, &payload, Uuid::nil(), None, None);
        let json = serde_json::to_value(row.to_envelope()).unwrap();
        assert_eq!(json["recordedTime"], 42);
        assert_eq!(json["messageType"], "fullevent");
        assert_eq!(json["destination"], "O=A,L=X,C=NL;O=B,L=Y,C=DE");
        assert!(json.get("origin").is_none());
    }

    #[test]
    fn broadcast_mode_derives_from_empty_destinations() {
        let payload = MessagePayload::Event(EventContent {
            event_uuid: Uuid::nil(),
            event_type: None,
            event_rdf: None,
            event_recorded: None,
        });
        let row =
            LedgerMessage::outbound(1, &BTreeSet::new(), &payload, Uuid::nil(), None, None);
        assert_eq!(row.distribution_mode, Some(DistributionMode::Broadcast));
        assert_eq!(row.status, MessageStatus::Created);
    }
}
