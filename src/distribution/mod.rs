//! Distribution rules: which peer(s) should receive a copy of an event.
//!
//! Rules are an ordered list evaluated first-match-wins. STATIC and BROADCAST rules
//! always match; a SPARQL rule matches iff its boolean query answers `true` against
//! the event RDF loaded into a throwaway in-memory graph. Destination sets are never
//! merged across rules.

use oxigraph::io::RdfFormat;
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Debug)]
pub enum DistributionError {
    /// The event RDF could not be loaded into the evaluation graph.
    Rdf(String),
    /// The rule's SPARQL query failed to parse or evaluate, or is not boolean.
    Query(String),
}

impl fmt::Display for DistributionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionError::Rdf(msg) => write!(f, "Distribution rule RDF error: {}", msg),
            DistributionError::Query(msg) => write!(f, "Distribution rule query error: {}", msg),
        }
    }
}

impl std::error::Error for DistributionError {}

/// A single distribution rule.
///
/// BROADCAST carries no destinations: an empty destination set downstream means
/// "deliver to all peers" and flips the ledger row to broadcast mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DistributionRule {
    Static { destinations: BTreeSet<String> },
    Broadcast,
    Sparql { query: String, destinations: BTreeSet<String> },
}

impl DistributionRule {
    /// Whether this rule applies to the given event RDF.
    pub fn applies_to(&self, event_rdf: &str) -> Result<bool, DistributionError> {
        match self {
            DistributionRule::Static { .. } | DistributionRule::Broadcast => Ok(true),
            DistributionRule::Sparql { query, .. } => evaluate_ask(event_rdf, query),
        }
    }

    pub fn destinations(&self) -> BTreeSet<String> {
        match self {
            DistributionRule::Static { destinations }
            | DistributionRule::Sparql { destinations, .. } => destinations.clone(),
            DistributionRule::Broadcast => BTreeSet::new(),
        }
    }
}

fn evaluate_ask(event_rdf: &str, query: &str) -> Result<bool, DistributionError> {
    let store = Store::new().map_err(|e| DistributionError::Rdf(e.to_string()))?;
    store
        .load_from_reader(RdfFormat::Turtle, event_rdf.as_bytes())
        .map_err(|e| DistributionError::Rdf(e.to_string()))?;

    let evaluator = SparqlEvaluator::new();
    let parsed =
        evaluator.parse_query(query).map_err(|e| DistributionError::Query(e.to_string()))?;
    let results =
        parsed.on_store(&store).execute().map_err(|e| DistributionError::Query(e.to_string()))?;
    match results {
        QueryResults::Boolean(answer) => Ok(answer),
        _ => Err(DistributionError::Query(
            "distribution rule must use a boolean (ASK) query".to_string(),
        )),
    }
}

/// Live-reloadable ordered rule list. Replacing the list takes effect on the next event.
#[derive(Clone)]
pub struct DistributionRuleRegistry {
    rules: Arc<RwLock<Vec<DistributionRule>>>,
}

impl DistributionRuleRegistry {
    pub fn new() -> Self {
        DistributionRuleRegistry { rules: Arc::new(RwLock::new(Vec::new())) }
    }

    pub fn replace(&self, rules: Vec<DistributionRule>) {
        *self.rules.write().unwrap() = rules;
    }

    pub fn list(&self) -> Vec<DistributionRule> {
        self.rules.read().unwrap().clone()
    }
}

pub struct DistributionRuleEngine {
    registry: DistributionRuleRegistry,
}

impl DistributionRuleEngine {
    pub fn new(registry: DistributionRuleRegistry) -> Self {
        DistributionRuleEngine { registry }
    }

    /// Evaluate the configured rules in order and return the first match's destinations.
    ///
    /// With no rules configured a single BROADCAST rule is assumed, so evaluation
    /// always yields a destination set.
    pub fn destinations_for(&self, event_rdf: &str) -> Result<BTreeSet<String>, DistributionError> {
        let rules = self.registry.list();
        if rules.is_empty() {
            debug!("no distribution rules configured, defaulting to broadcast");
            return Ok(BTreeSet::new());
        }
        for rule in &rules {
            if rule.applies_to(event_rdf)? {
                debug!(?rule, "using first matching distribution rule");
                return Ok(rule.destinations());
            }
        }
        // An ordered list without a terminal BROADCAST may match nothing.
        Ok(BTreeSet::new())
    }
}
