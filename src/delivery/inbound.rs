//! Inbound peer messages: apply them to the ledger, enforcing authorization.
//!
//! Processing errors are caught per message, logged, and acknowledged to the sender —
//! deliver-and-forget. Consistency lives in the receiving ledger's status column, not
//! in a wire-level NACK. Only full-event requests can be rejected, and a rejection
//! never mutates the original outbound row.

use crate::core::{epoch_secs, EnrichedEvent};
use crate::event::enricher::rewrite_blank_nodes;
use crate::event::mapping::MappingEngine;
use crate::event::types::EventTypeRegistry;
use crate::ledger::message::{MessageStatus, MessageType, PeerEnvelope};
use crate::ledger::service::MessageLedger;
use crate::triplestore::TripleStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome reported back to the peer endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Accepted,
    /// The full-event request referenced an unknown message.
    NotFound,
    /// The requester is not among the original destinations, or the original
    /// message never reached the SEND state.
    Unauthorized,
}

pub struct InboundMessageHandler {
    ledger: Arc<MessageLedger>,
    triple_store: Arc<dyn TripleStore>,
    event_types: EventTypeRegistry,
    mapping_engine: Arc<dyn MappingEngine>,
}

impl InboundMessageHandler {
    pub fn new(
        ledger: Arc<MessageLedger>,
        triple_store: Arc<dyn TripleStore>,
        event_types: EventTypeRegistry,
        mapping_engine: Arc<dyn MappingEngine>,
    ) -> Self {
        InboundMessageHandler { ledger, triple_store, event_types, mapping_engine }
    }

    pub async fn receive(&self, envelope: PeerEnvelope) -> ReceiveOutcome {
        info!(message_id = %envelope.message_id, message_type = %envelope.message_type, "received new message");
        match envelope.message_type {
            MessageType::Event => {
                if let Err(err) = self.receive_event(&envelope).await {
                    warn!(message_id = %envelope.message_id, error = %err, "not processing message");
                }
                ReceiveOutcome::Accepted
            }
            MessageType::FullEventRequest => self.receive_full_event_request(&envelope).await,
        }
    }

    /// Store the event RECEIVED; advance to INVALID when the triple store refuses it.
    async fn receive_event(&self, envelope: &PeerEnvelope) -> Result<(), String> {
        let content = self.ledger.receive_event(envelope).map_err(|e| e.to_string())?;
        let insert = match content.event_rdf.as_deref() {
            Some(rdf) => self.triple_store.insert(rdf).await.map_err(|e| e.to_string()),
            None => Err("event payload carries no RDF".to_string()),
        };
        if let Err(err) = insert {
            warn!(message_id = %envelope.message_id, error = %err, "marking inbound event invalid");
            self.ledger
                .update_status(envelope.message_id, MessageStatus::Invalid)
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Honor a full-event request only when the referenced outbound row reached SEND
    /// and its destinations contain the requester's declared origin.
    async fn receive_full_event_request(&self, envelope: &PeerEnvelope) -> ReceiveOutcome {
        let content = match self.ledger.receive_full_event_request(envelope) {
            Ok(content) => content,
            Err(err) => {
                warn!(message_id = %envelope.message_id, error = %err, "not processing message");
                return ReceiveOutcome::Accepted;
            }
        };
        info!(event_uuid = %content.event_uuid, "full event data requested");

        let requester = envelope.origin.clone().unwrap_or_default();
        let original = match self.ledger.find_message(content.event_uuid) {
            Some(row) => row,
            None => {
                self.mark_request(envelope.message_id, MessageStatus::Refused);
                return ReceiveOutcome::NotFound;
            }
        };
        if original.status != MessageStatus::Send || !original.has_destination(&requester) {
            self.mark_request(envelope.message_id, MessageStatus::Refused);
            return ReceiveOutcome::Unauthorized;
        }

        match self.resend_full_event(&original.original_json, original.event_type.as_deref(), &requester).await
        {
            Ok(()) => self.mark_request(envelope.message_id, MessageStatus::Forwarded),
            Err(err) => {
                warn!(event_uuid = %content.event_uuid, error = %err, "unable to resend full event")
            }
        }
        ReceiveOutcome::Accepted
    }

    /// Rebuild the full event from the stored JSON and address it to the requester only.
    async fn resend_full_event(
        &self,
        original_json: &Option<String>,
        event_type: Option<&str>,
        requester: &str,
    ) -> Result<(), String> {
        let event_type = event_type
            .and_then(|name| self.event_types.get(name))
            .ok_or_else(|| "event type no longer registered".to_string())?;
        let original_json =
            original_json.as_deref().ok_or_else(|| "original JSON not retained".to_string())?;

        let node: serde_json::Value =
            serde_json::from_str(original_json).map_err(|e| e.to_string())?;
        let rdf = self
            .mapping_engine
            .map(&node, &event_type.mapping)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "no output from mapping".to_string())?;

        let message_uuid = Uuid::new_v4();
        let full_rdf = rewrite_blank_nodes(&rdf, &event_type.name, &message_uuid);
        let destinations: BTreeSet<String> =
            requester.split(';').map(|d| d.to_string()).collect();
        let event = EnrichedEvent {
            event_json: original_json.to_string(),
            event_type,
            event_uuid: message_uuid,
            event_rdf: full_rdf,
            minimized_rdf: None,
            recorded_time: epoch_secs(),
        };
        self.ledger
            .send_event(&event, &destinations, Some(message_uuid))
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn mark_request(&self, message_id: Uuid, status: MessageStatus) {
        if let Err(err) = self.ledger.update_status(message_id, status) {
            warn!(%message_id, error = %err, "unable to update request status");
        }
    }
}
