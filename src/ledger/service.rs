//! The message ledger: a durable state machine over outbound and inbound messages.
//!
//! Outbound rows are inserted CREATED before the network call and advance to SEND or
//! FAILED exactly once; a failed delivery is rethrown so the original caller observes
//! it — a retry is a fresh row with a new correlation id. Inbound rows are stored
//! RECEIVED and advanced by the inbound handler.

use crate::core::{epoch_secs, EnrichedEvent};
use crate::delivery::client::{DeliveryError, MessageTransport};
use crate::ledger::message::{
    EventContent, FullEventRequestContent, LedgerMessage, MessagePayload, MessageStatus,
    PayloadCodecError, PeerEnvelope, FAILED_STATUSES, INCOMING_STATUSES, OUTGOING_STATUSES,
};
use crate::ledger::store::{LedgerStore, LedgerStoreError};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub enum LedgerError {
    Delivery(DeliveryError),
    Codec(PayloadCodecError),
    Store(LedgerStoreError),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Delivery(err) => write!(f, "{}", err),
            LedgerError::Codec(err) => write!(f, "{}", err),
            LedgerError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<DeliveryError> for LedgerError {
    fn from(err: DeliveryError) -> Self {
        LedgerError::Delivery(err)
    }
}

impl From<PayloadCodecError> for LedgerError {
    fn from(err: PayloadCodecError) -> Self {
        LedgerError::Codec(err)
    }
}

impl From<LedgerStoreError> for LedgerError {
    fn from(err: LedgerStoreError) -> Self {
        LedgerError::Store(err)
    }
}

/// Viewer buckets exposed by the message listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageView {
    Incoming,
    Outgoing,
    Failed,
}

impl FromStr for MessageView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(MessageView::Incoming),
            "outgoing" => Ok(MessageView::Outgoing),
            "failed" => Ok(MessageView::Failed),
            other => Err(format!("unknown message view: {}", other)),
        }
    }
}

pub struct MessageLedger {
    store: Arc<dyn LedgerStore>,
    transport: Arc<dyn MessageTransport>,
}

impl MessageLedger {
    pub fn new(store: Arc<dyn LedgerStore>, transport: Arc<dyn MessageTransport>) -> Self {
        MessageLedger { store, transport }
    }

    /// Record and deliver an enriched event.
    ///
    /// Peers receive the minimized RDF when the event type minimizes; the full RDF
    /// otherwise. The stored row keeps the enriched JSON so the full event can be
    /// rebuilt when a peer asks for it.
    pub async fn send_event(
        &self,
        event: &EnrichedEvent,
        destinations: &BTreeSet<String>,
        message_id: Option<Uuid>,
    ) -> Result<Uuid, LedgerError> {
        let rdf = event.minimized_rdf.as_ref().unwrap_or(&event.event_rdf);
        let payload = MessagePayload::Event(EventContent {
            event_uuid: event.event_uuid,
            event_type: Some(event.event_type.name.clone()),
            event_rdf: Some(rdf.clone()),
            event_recorded: Some(event.recorded_time),
        });
        let row = LedgerMessage::outbound(
            event.recorded_time,
            destinations,
            &payload,
            message_id.unwrap_or(event.event_uuid),
            Some(event.event_json.clone()),
            Some(event.event_type.name.clone()),
        );
        self.dispatch(row).await
    }

    /// Record and deliver a request for the full version of a previously received event.
    pub async fn request_full_event(
        &self,
        event_uuid: Uuid,
        destinations: &BTreeSet<String>,
    ) -> Result<Uuid, LedgerError> {
        let payload = MessagePayload::FullEventRequest(FullEventRequestContent { event_uuid });
        let row = LedgerMessage::outbound(
            epoch_secs(),
            destinations,
            &payload,
            Uuid::new_v4(),
            None,
            None,
        );
        self.dispatch(row).await
    }

    /// CREATED → deliver → SEND, or CREATED → FAILED with the delivery error rethrown.
    async fn dispatch(&self, row: LedgerMessage) -> Result<Uuid, LedgerError> {
        let message_id = row.message_id;
        info!(%message_id, "inserting outbound message into the ledger");
        let inserted = self.store.insert(row)?;

        if let Err(err) = self.transport.send(&inserted.to_envelope()).await {
            self.store.update_status(message_id, MessageStatus::Failed)?;
            return Err(err.into());
        }
        self.store.update_status(message_id, MessageStatus::Send)?;
        Ok(message_id)
    }

    /// Store an inbound EVENT message as RECEIVED and hand back its decoded content.
    ///
    /// The row takes the sender's recorded time when the payload carries one.
    pub fn receive_event(&self, envelope: &PeerEnvelope) -> Result<EventContent, LedgerError> {
        let payload = MessagePayload::decode(envelope.message_type, &envelope.message)?;
        let content = match payload {
            MessagePayload::Event(content) => content,
            MessagePayload::FullEventRequest(_) => {
                return Err(LedgerError::Codec(PayloadCodecError::Json(
                    "expected an event payload".to_string(),
                )))
            }
        };
        let recorded_time = content.event_recorded.unwrap_or_else(epoch_secs);
        let row = LedgerMessage::inbound(envelope, recorded_time, content.event_type.clone());
        info!(message_id = %envelope.message_id, "inserting inbound event into the ledger");
        self.store.insert(row)?;
        Ok(content)
    }

    /// Store an inbound FULL_EVENT_REQUEST as RECEIVED and hand back its decoded content.
    ///
    /// The relay does not forward a recorded time for requests, so receipt time is used.
    pub fn receive_full_event_request(
        &self,
        envelope: &PeerEnvelope,
    ) -> Result<FullEventRequestContent, LedgerError> {
        let payload = MessagePayload::decode(envelope.message_type, &envelope.message)?;
        let content = match payload {
            MessagePayload::FullEventRequest(content) => content,
            MessagePayload::Event(_) => {
                return Err(LedgerError::Codec(PayloadCodecError::Json(
                    "expected a full event request payload".to_string(),
                )))
            }
        };
        let row = LedgerMessage::inbound(envelope, epoch_secs(), None);
        info!(message_id = %envelope.message_id, "inserting inbound full event request into the ledger");
        self.store.insert(row)?;
        Ok(content)
    }

    pub fn update_status(&self, message_id: Uuid, status: MessageStatus) -> Result<(), LedgerError> {
        info!(%message_id, %status, "updating message status in the ledger");
        self.store.update_status(message_id, status)?;
        Ok(())
    }

    pub fn find_message(&self, message_id: Uuid) -> Option<LedgerMessage> {
        self.store.find_by_message_id(message_id)
    }

    /// List messages, newest first, optionally restricted to a viewer bucket.
    pub fn list_messages(
        &self,
        view: Option<MessageView>,
        page: usize,
        size: usize,
    ) -> Vec<LedgerMessage> {
        match view {
            None => self.store.list(page, size),
            Some(MessageView::Incoming) => self.store.list_by_status(INCOMING_STATUSES, page, size),
            Some(MessageView::Outgoing) => self.store.list_by_status(OUTGOING_STATUSES, page, size),
            Some(MessageView::Failed) => self.store.list_by_status(FAILED_STATUSES, page, size),
        }
    }
}
