//! Tests for the retention cleaner's two-store sweep.

use hermes::core::epoch_secs;
use hermes::event::types::EventTypeRegistry;
use hermes::ledger::message::{EventContent, LedgerMessage, MessagePayload};
use hermes::ledger::store::{InMemoryLedgerStore, LedgerStore};
use hermes::retention::RetentionCleaner;
use hermes::triplestore::{MemoryTripleStore, TripleStore};
use hermes::EventType;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

fn outbound_event_row(event_uuid: Uuid, recorded_time: u64) -> LedgerMessage {
    let payload = MessagePayload::Event(EventContent {
        event_uuid,
        event_type: Some("test.v1".to_string()),
        event_rdf: Some(format!("<http://test.v1/{}/0> <http://ex/weight> \"10\" .", event_uuid)),
        event_recorded: Some(recorded_time),
    });
    LedgerMessage::outbound(
        recorded_time,
        &BTreeSet::new(),
        &payload,
        event_uuid,
        None,
        Some("test.v1".to_string()),
    )
}

async fn insert_event(
    store: &InMemoryLedgerStore,
    triples: &MemoryTripleStore,
    recorded_time: u64,
) -> Uuid {
    let event_uuid = Uuid::new_v4();
    store.insert(outbound_event_row(event_uuid, recorded_time)).unwrap();
    triples
        .insert(&format!("<http://test.v1/{}/0> <http://ex/weight> \"10\" .", event_uuid))
        .await
        .unwrap();
    event_uuid
}

async fn has_triples(triples: &MemoryTripleStore, event_uuid: Uuid) -> bool {
    let results = triples
        .query(&format!(
            "SELECT ?p WHERE {{ ?s ?p ?o . FILTER regex(STR(?s), \"{}\") }}",
            event_uuid
        ))
        .await
        .unwrap();
    results.contains("http://ex/weight")
}

#[tokio::test]
async fn zero_day_retention_purges_past_rows_and_keeps_future_ones() {
    let registry = EventTypeRegistry::new();
    let mut event_type = EventType::new("test.v1", r#"{"entities":[]}"#);
    event_type.retention_days = Some(0);
    registry.register(event_type).unwrap();

    let store = Arc::new(InMemoryLedgerStore::new());
    let triples = Arc::new(MemoryTripleStore::new().unwrap());

    // cutoff = now - 0 days: one row just before it, one just after.
    let now = epoch_secs();
    let expired = insert_event(&store, &triples, now - 1).await;
    let fresh = insert_event(&store, &triples, now + 1).await;

    let cleaner = RetentionCleaner::new(registry, store.clone(), triples.clone());
    cleaner.sweep().await;

    assert!(store.find_by_message_id(expired).is_none());
    assert!(store.find_by_message_id(fresh).is_some());
    assert!(!has_triples(&triples, expired).await);
    assert!(has_triples(&triples, fresh).await);
}

#[tokio::test]
async fn types_without_retention_are_left_alone() {
    let registry = EventTypeRegistry::new();
    registry.register(EventType::new("test.v1", r#"{"entities":[]}"#)).unwrap();

    let store = Arc::new(InMemoryLedgerStore::new());
    let triples = Arc::new(MemoryTripleStore::new().unwrap());
    let old = insert_event(&store, &triples, 1).await;

    let cleaner = RetentionCleaner::new(registry, store.clone(), triples.clone());
    cleaner.sweep().await;

    assert!(store.find_by_message_id(old).is_some());
    assert!(has_triples(&triples, old).await);
}

#[tokio::test]
async fn sweep_only_touches_the_configured_type() {
    let registry = EventTypeRegistry::new();
    let mut retained = EventType::new("test.v1", r#"{"entities":[]}"#);
    retained.retention_days = Some(0);
    registry.register(retained).unwrap();

    let store = Arc::new(InMemoryLedgerStore::new());
    let triples = Arc::new(MemoryTripleStore::new().unwrap());

    let now = epoch_secs();
    let other_uuid = Uuid::new_v4();
    let mut other_row = outbound_event_row(other_uuid, now - 100);
    other_row.event_type = Some("other.v1".to_string());
    store.insert(other_row).unwrap();

    let cleaner = RetentionCleaner::new(registry, store.clone(), triples);
    cleaner.sweep().await;

    assert!(store.find_by_message_id(other_uuid).is_some());
}
