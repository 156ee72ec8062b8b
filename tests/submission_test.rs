//! End-to-end submission flow: enrich, store, distribute, fetch.

use async_trait::async_trait;
use hermes::delivery::client::{DeliveryError, MessageTransport};
use hermes::distribution::{DistributionRule, DistributionRuleEngine, DistributionRuleRegistry};
use hermes::event::enricher::EventEnricher;
use hermes::event::mapping::TemplateMapper;
use hermes::event::service::{EventService, EventServiceError};
use hermes::event::types::EventTypeRegistry;
use hermes::event::validation::{JsonSchemaValidator, SparqlShapeValidator};
use hermes::ledger::message::PeerEnvelope;
use hermes::ledger::service::{MessageLedger, MessageView};
use hermes::ledger::store::InMemoryLedgerStore;
use hermes::triplestore::MemoryTripleStore;
use hermes::{EventType, MessageStatus, MessageType};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

const WEIGHT_MAPPING: &str = r#"{
    "entities": [
        {
            "node": "_:0",
            "properties": [
                { "field": "weight", "predicate": "http://ex/weight",
                  "datatype": "http://www.w3.org/2001/XMLSchema#decimal" },
                { "field": "UUID", "predicate": "http://ex/eventUUID" }
            ]
        }
    ]
}"#;

struct RecordingTransport {
    sent: Mutex<Vec<PeerEnvelope>>,
    fail: bool,
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, envelope: &PeerEnvelope) -> Result<(), DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Unreachable("no peers".to_string()));
        }
        self.sent.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

struct Node {
    events: EventService,
    ledger: Arc<MessageLedger>,
    rules: DistributionRuleRegistry,
}

fn node(fail_delivery: bool) -> Node {
    let event_types = EventTypeRegistry::new();
    event_types.register(EventType::new("test.v1", WEIGHT_MAPPING)).unwrap();

    let mapper = Arc::new(TemplateMapper::new());
    let enricher = EventEnricher::new(
        event_types.clone(),
        mapper,
        Arc::new(JsonSchemaValidator::new()),
        Arc::new(SparqlShapeValidator::new()),
    );

    let store = Arc::new(InMemoryLedgerStore::new());
    let transport =
        Arc::new(RecordingTransport { sent: Mutex::new(Vec::new()), fail: fail_delivery });
    let ledger = Arc::new(MessageLedger::new(store, transport));

    let rules = DistributionRuleRegistry::new();
    let triple_store = Arc::new(MemoryTripleStore::new().unwrap());
    let events = EventService::new(
        enricher,
        DistributionRuleEngine::new(rules.clone()),
        Arc::clone(&ledger),
        triple_store,
    );
    Node { events, ledger, rules }
}

#[tokio::test]
async fn submission_round_trip() {
    let n = node(false);

    let event = n.events.submit_event(r#"{"weight": 10}"#, "test.v1", None).await.unwrap();

    // One ledger row: an EVENT that reached SEND, in broadcast mode (no rules configured).
    let rows = n.ledger.list_messages(None, 0, 10);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].message_type, MessageType::Event);
    assert_eq!(rows[0].status, MessageStatus::Send);
    assert_eq!(rows[0].message_id, event.event_uuid);

    // Fetching the event returns RDF containing the injected UUID.
    let results = n.events.fetch_event_by_uuid(event.event_uuid).await.unwrap();
    assert!(results.contains(&event.event_uuid.to_string()));
    assert!(results.contains("http://ex/weight"));
}

#[tokio::test]
async fn submission_with_absent_peers_fails_visibly_but_stores_locally() {
    let n = node(true);

    let err = n.events.submit_event(r#"{"weight": 10}"#, "test.v1", None).await.unwrap_err();
    assert!(matches!(err, EventServiceError::Ledger(_)));

    // The delivery failure is on the ledger; the enriched event is still queryable.
    let rows = n.ledger.list_messages(Some(MessageView::Failed), 0, 10);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, MessageStatus::Failed);

    let uuid = rows[0].message_id;
    let results = n.events.fetch_event_by_uuid(uuid).await.unwrap();
    assert!(results.contains(&uuid.to_string()));
}

#[tokio::test]
async fn explicit_destinations_bypass_rule_evaluation() {
    let n = node(false);
    // A rule that would route everything elsewhere.
    n.rules.replace(vec![DistributionRule::Static {
        destinations: ["O=Elsewhere,L=Q,C=XX".to_string()].into_iter().collect(),
    }]);

    let explicit: BTreeSet<String> = ["O=A,L=X,C=NL".to_string()].into_iter().collect();
    n.events
        .submit_event(r#"{"weight": 10}"#, "test.v1", Some(explicit))
        .await
        .unwrap();

    let rows = n.ledger.list_messages(None, 0, 10);
    assert_eq!(rows[0].destinations.as_deref(), Some("O=A,L=X,C=NL"));
}

#[tokio::test]
async fn validate_event_has_no_side_effects() {
    let n = node(false);

    let event = n.events.validate_event(r#"{"weight": 10}"#, "test.v1").unwrap();
    assert!(!event.event_rdf.contains("_:"));

    assert!(n.ledger.list_messages(None, 0, 10).is_empty());
    let results = n.events.fetch_event_by_uuid(event.event_uuid).await.unwrap();
    assert!(!results.contains(&event.event_uuid.to_string()));
}
