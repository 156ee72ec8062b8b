//! Tests for the inbound message handler: receipt, authorization, full-event resend.

use async_trait::async_trait;
use hermes::core::epoch_secs;
use hermes::delivery::client::{DeliveryError, MessageTransport};
use hermes::delivery::inbound::{InboundMessageHandler, ReceiveOutcome};
use hermes::event::mapping::TemplateMapper;
use hermes::event::types::EventTypeRegistry;
use hermes::ledger::message::{EventContent, FullEventRequestContent, MessagePayload, PeerEnvelope};
use hermes::ledger::service::MessageLedger;
use hermes::ledger::store::{InMemoryLedgerStore, LedgerStore};
use hermes::triplestore::{MemoryTripleStore, TripleStore, TripleStoreError};
use hermes::{EnrichedEvent, EventType, MessageStatus, MessageType};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const PEER: &str = "O=B,L=Y,C=DE";
const OTHER_PEER: &str = "O=C,L=Z,C=FR";

const WEIGHT_MAPPING: &str = r#"{
    "entities": [
        {
            "node": "_:0",
            "properties": [
                { "field": "weight", "predicate": "http://ex/weight" },
                { "field": "UUID", "predicate": "http://ex/eventUUID" }
            ]
        }
    ]
}"#;

struct RecordingTransport {
    sent: Mutex<Vec<PeerEnvelope>>,
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, envelope: &PeerEnvelope) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Triple store that refuses every insert.
struct RefusingTripleStore;

#[async_trait]
impl TripleStore for RefusingTripleStore {
    async fn insert(&self, _turtle: &str) -> Result<(), TripleStoreError> {
        Err(TripleStoreError::Server("disk full".to_string()))
    }

    async fn query(&self, _sparql: &str) -> Result<String, TripleStoreError> {
        Ok(String::new())
    }

    async fn update(&self, _sparql: &str) -> Result<(), TripleStoreError> {
        Ok(())
    }
}

struct Fixture {
    handler: InboundMessageHandler,
    ledger: Arc<MessageLedger>,
    store: Arc<InMemoryLedgerStore>,
}

fn fixture(triple_store: Arc<dyn TripleStore>) -> Fixture {
    let store = Arc::new(InMemoryLedgerStore::new());
    let ledger = Arc::new(MessageLedger::new(
        store.clone(),
        Arc::new(RecordingTransport { sent: Mutex::new(Vec::new()) }),
    ));
    let event_types = EventTypeRegistry::new();
    event_types.register(EventType::new("test.v1", WEIGHT_MAPPING)).unwrap();
    let handler = InboundMessageHandler::new(
        Arc::clone(&ledger),
        triple_store,
        event_types,
        Arc::new(TemplateMapper::new()),
    );
    Fixture { handler, ledger, store }
}

fn event_envelope() -> PeerEnvelope {
    let payload = MessagePayload::Event(EventContent {
        event_uuid: Uuid::new_v4(),
        event_type: Some("test.v1".to_string()),
        event_rdf: Some("<http://ex/s> <http://ex/p> \"o\" .".to_string()),
        event_recorded: Some(epoch_secs()),
    });
    PeerEnvelope {
        recorded_time: None,
        message_id: Uuid::new_v4(),
        message_type: MessageType::Event,
        message: payload.encode(),
        origin: Some(PEER.to_string()),
        destination: None,
    }
}

fn full_event_request(event_uuid: Uuid, origin: &str) -> PeerEnvelope {
    let payload = MessagePayload::FullEventRequest(FullEventRequestContent { event_uuid });
    PeerEnvelope {
        recorded_time: None,
        message_id: Uuid::new_v4(),
        message_type: MessageType::FullEventRequest,
        message: payload.encode(),
        origin: Some(origin.to_string()),
        destination: None,
    }
}

/// An outbound row in SEND state addressed to `PEER`, as a prior submission leaves it.
async fn sent_event(ledger: &MessageLedger) -> Uuid {
    let uuid = Uuid::new_v4();
    let event = EnrichedEvent {
        event_json: format!("{{\"weight\": 10, \"UUID\": \"{}\"}}", uuid),
        event_type: EventType::new("test.v1", WEIGHT_MAPPING),
        event_uuid: uuid,
        event_rdf: format!("<http://test.v1/{}/0> <http://ex/weight> \"10\" .", uuid),
        minimized_rdf: Some(format!("<http://test.v1/{}/0> <http://ex/eventUUID> \"{}\" .", uuid, uuid)),
        recorded_time: epoch_secs(),
    };
    ledger
        .send_event(&event, &[PEER.to_string()].into_iter().collect::<BTreeSet<_>>(), None)
        .await
        .unwrap()
}

#[tokio::test]
async fn inbound_event_lands_in_the_triple_store() {
    let triple_store = Arc::new(MemoryTripleStore::new().unwrap());
    let f = fixture(triple_store.clone());

    let envelope = event_envelope();
    assert_eq!(f.handler.receive(envelope.clone()).await, ReceiveOutcome::Accepted);

    let row = f.store.find_by_message_id(envelope.message_id).unwrap();
    assert_eq!(row.status, MessageStatus::Received);
    let results = triple_store
        .query("SELECT ?s WHERE { ?s <http://ex/p> ?o }")
        .await
        .unwrap();
    assert!(results.contains("http://ex/s"));
}

#[tokio::test]
async fn failing_triple_store_marks_the_event_invalid() {
    let f = fixture(Arc::new(RefusingTripleStore));

    let envelope = event_envelope();
    // Still acknowledged: consistency lives in the ledger status, not a wire NACK.
    assert_eq!(f.handler.receive(envelope.clone()).await, ReceiveOutcome::Accepted);

    let row = f.store.find_by_message_id(envelope.message_id).unwrap();
    assert_eq!(row.status, MessageStatus::Invalid);
}

#[tokio::test]
async fn full_event_request_from_stranger_is_rejected_without_mutation() {
    let f = fixture(Arc::new(MemoryTripleStore::new().unwrap()));
    let original_id = sent_event(&f.ledger).await;

    let request = full_event_request(original_id, OTHER_PEER);
    assert_eq!(f.handler.receive(request.clone()).await, ReceiveOutcome::Unauthorized);

    // The original outbound row is untouched; the request row is refused.
    assert_eq!(f.store.find_by_message_id(original_id).unwrap().status, MessageStatus::Send);
    assert_eq!(
        f.store.find_by_message_id(request.message_id).unwrap().status,
        MessageStatus::Refused
    );
}

#[tokio::test]
async fn full_event_request_for_unknown_event_is_not_found() {
    let f = fixture(Arc::new(MemoryTripleStore::new().unwrap()));
    let request = full_event_request(Uuid::new_v4(), PEER);
    assert_eq!(f.handler.receive(request).await, ReceiveOutcome::NotFound);
}

#[tokio::test]
async fn honored_full_event_request_emits_a_new_outbound_event() {
    let f = fixture(Arc::new(MemoryTripleStore::new().unwrap()));
    let original_id = sent_event(&f.ledger).await;

    let request = full_event_request(original_id, PEER);
    assert_eq!(f.handler.receive(request.clone()).await, ReceiveOutcome::Accepted);

    // The request row is marked forwarded once the full event went out.
    assert_eq!(
        f.store.find_by_message_id(request.message_id).unwrap().status,
        MessageStatus::Forwarded
    );

    // A fresh outbound EVENT row addressed only to the requester, carrying the
    // re-mapped full RDF rather than the minimized projection.
    let resend = f
        .store
        .list(0, 50)
        .into_iter()
        .find(|r| {
            r.message_type == MessageType::Event
                && r.message_id != original_id
                && r.destinations.is_some()
        })
        .expect("resent full event row");
    assert_eq!(resend.status, MessageStatus::Send);
    assert_eq!(resend.destinations.as_deref(), Some(PEER));
    match resend.decoded_payload().unwrap() {
        MessagePayload::Event(content) => {
            let rdf = content.event_rdf.unwrap();
            assert!(rdf.contains("http://ex/weight"), "full RDF expected: {}", rdf);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}
