//! Event submission surface: enrich, store locally, distribute.

use crate::core::EnrichedEvent;
use crate::distribution::{DistributionError, DistributionRuleEngine};
use crate::event::enricher::{EnrichError, EventEnricher};
use crate::ledger::service::{LedgerError, MessageLedger};
use crate::triplestore::{event_select_query, TripleStore, TripleStoreError};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub enum EventServiceError {
    Enrich(EnrichError),
    Distribution(DistributionError),
    TripleStore(TripleStoreError),
    /// Local validation and storage may have succeeded even though distribution failed.
    Ledger(LedgerError),
}

impl fmt::Display for EventServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventServiceError::Enrich(err) => write!(f, "{}", err),
            EventServiceError::Distribution(err) => write!(f, "{}", err),
            EventServiceError::TripleStore(err) => write!(f, "{}", err),
            EventServiceError::Ledger(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EventServiceError {}

impl From<EnrichError> for EventServiceError {
    fn from(err: EnrichError) -> Self {
        EventServiceError::Enrich(err)
    }
}

impl From<DistributionError> for EventServiceError {
    fn from(err: DistributionError) -> Self {
        EventServiceError::Distribution(err)
    }
}

impl From<TripleStoreError> for EventServiceError {
    fn from(err: TripleStoreError) -> Self {
        EventServiceError::TripleStore(err)
    }
}

impl From<LedgerError> for EventServiceError {
    fn from(err: LedgerError) -> Self {
        EventServiceError::Ledger(err)
    }
}

pub struct EventService {
    enricher: EventEnricher,
    rule_engine: DistributionRuleEngine,
    ledger: Arc<MessageLedger>,
    triple_store: Arc<dyn TripleStore>,
}

impl EventService {
    pub fn new(
        enricher: EventEnricher,
        rule_engine: DistributionRuleEngine,
        ledger: Arc<MessageLedger>,
        triple_store: Arc<dyn TripleStore>,
    ) -> Self {
        EventService { enricher, rule_engine, ledger, triple_store }
    }

    /// Enrich a submission, insert its full RDF locally, and distribute it.
    ///
    /// Explicit destinations skip rule evaluation entirely. The call does not return
    /// success until the peer delivery completed or failed; a delivery failure leaves
    /// the event stored locally with its ledger row marked FAILED.
    pub async fn submit_event(
        &self,
        event_json: &str,
        event_type: &str,
        destinations: Option<BTreeSet<String>>,
    ) -> Result<EnrichedEvent, EventServiceError> {
        let event = self.enricher.enrich(event_json, event_type)?;
        self.triple_store.insert(&event.event_rdf).await?;

        let destinations = match destinations {
            Some(explicit) => explicit,
            None => self.rule_engine.destinations_for(&event.event_rdf)?,
        };
        info!(
            event_type = %event.event_type.name,
            event_uuid = %event.event_uuid,
            ?destinations,
            "distributing event"
        );
        self.ledger.send_event(&event, &destinations, None).await?;
        Ok(event)
    }

    /// Run the enrichment pipeline only; no persistence, no distribution.
    pub fn validate_event(
        &self,
        event_json: &str,
        event_type: &str,
    ) -> Result<EnrichedEvent, EventServiceError> {
        Ok(self.enricher.enrich(event_json, event_type)?)
    }

    /// Ask peers for the full version of a previously received event.
    pub async fn request_full_event(
        &self,
        event_uuid: Uuid,
        destinations: BTreeSet<String>,
    ) -> Result<Uuid, EventServiceError> {
        Ok(self.ledger.request_full_event(event_uuid, &destinations).await?)
    }

    /// Fetch the triples of a stored event. Every node the event generated sits under
    /// an IRI carrying its UUID, so the UUID alone scopes the query.
    pub async fn fetch_event_by_uuid(
        &self,
        event_uuid: Uuid,
    ) -> Result<String, EventServiceError> {
        Ok(self.triple_store.query(&event_select_query(&event_uuid.to_string())).await?)
    }
}
