//! Scheduled purge of ledger rows and triples past a per-event-type TTL.
//!
//! The two deletes are not transactional across the stores: a failure removing one
//! event's triples is logged and blocks neither the rest of the sweep nor the
//! ledger-row deletion.

use crate::core::epoch_secs;
use crate::event::types::EventTypeRegistry;
use crate::ledger::message::MessagePayload;
use crate::ledger::store::LedgerStore;
use crate::triplestore::{event_delete_query, TripleStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub struct RetentionCleaner {
    event_types: EventTypeRegistry,
    store: Arc<dyn LedgerStore>,
    triple_store: Arc<dyn TripleStore>,
}

impl RetentionCleaner {
    pub fn new(
        event_types: EventTypeRegistry,
        store: Arc<dyn LedgerStore>,
        triple_store: Arc<dyn TripleStore>,
    ) -> Self {
        RetentionCleaner { event_types, store, triple_store }
    }

    /// One sweep over every event type with a configured retention.
    pub async fn sweep(&self) {
        info!("cleanup process waking up");
        for event_type in self.event_types.list() {
            let days = match event_type.retention_days {
                Some(days) => days,
                None => continue,
            };
            let cutoff = epoch_secs().saturating_sub(days * SECONDS_PER_DAY);
            self.sweep_type(&event_type.name, cutoff).await;
        }
        info!("cleanup process done");
    }

    async fn sweep_type(&self, event_type: &str, cutoff: u64) {
        let expired = self.store.find_of_type_before(event_type, cutoff);
        info!(event_type, count = expired.len(), "events will be cleaned");
        if expired.is_empty() {
            return;
        }

        // Both sent and received copies carry the event UUID in the payload; that is
        // what scopes the triples, not the row's correlation id.
        for row in &expired {
            let prefix = match row.decoded_payload() {
                Ok(MessagePayload::Event(content)) => {
                    let name = content.event_type.as_deref().unwrap_or(event_type);
                    format!("{}/{}/", name, content.event_uuid)
                }
                Ok(MessagePayload::FullEventRequest(_)) => continue,
                Err(err) => {
                    warn!(message_id = %row.message_id, error = %err, "skipping row with unreadable payload");
                    continue;
                }
            };
            match self.triple_store.update(&event_delete_query(&prefix)).await {
                Ok(()) => debug!(prefix, "removed event triples"),
                Err(err) => {
                    warn!(prefix, error = %err, "unable to remove event triples, continuing")
                }
            }
        }

        match self.store.delete_of_type_before(event_type, cutoff) {
            Ok(deleted) => info!(event_type, deleted, "removed expired ledger rows"),
            Err(err) => warn!(event_type, error = %err, "unable to remove expired ledger rows"),
        }
    }

    /// Periodic task entry point, default daily.
    pub async fn run(self, interval: Duration) {
        // The first tick fires immediately, so a sweep also runs at startup.
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }
}
