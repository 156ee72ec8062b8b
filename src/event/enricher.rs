//! The per-submission enrichment pipeline: validate → map → stamp → rewrite → validate.
//!
//! Produces an [`EnrichedEvent`] and nothing else — persistence and distribution are
//! the caller's responsibility.

use crate::core::{
    epoch_secs, EnrichedEvent, EVENT_RECORDED_FIELD, EVENT_TYPE_FIELD, EVENT_UUID_FIELD,
};
use crate::event::mapping::{MappingEngine, MappingEngineError};
use crate::event::types::EventTypeRegistry;
use crate::event::validation::{
    SchemaValidationError, SchemaValidator, ShapeValidationError, ShapeValidator,
};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
pub enum EnrichError {
    EventTypeNotFound(String),
    /// The submission is not a JSON object.
    InvalidJson(String),
    Schema(SchemaValidationError),
    /// The mapping engine failed or produced no output.
    Mapping(String),
    Shape(ShapeValidationError),
}

impl fmt::Display for EnrichError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichError::EventTypeNotFound(name) => write!(f, "EventType not found: {}", name),
            EnrichError::InvalidJson(msg) => {
                write!(f, "Unexpected event data, invalid JSON data: {}", msg)
            }
            EnrichError::Schema(err) => write!(f, "{}", err),
            EnrichError::Mapping(msg) => write!(f, "{}", msg),
            EnrichError::Shape(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EnrichError {}

impl From<SchemaValidationError> for EnrichError {
    fn from(err: SchemaValidationError) -> Self {
        EnrichError::Schema(err)
    }
}

impl From<ShapeValidationError> for EnrichError {
    fn from(err: ShapeValidationError) -> Self {
        EnrichError::Shape(err)
    }
}

impl From<MappingEngineError> for EnrichError {
    fn from(err: MappingEngineError) -> Self {
        EnrichError::Mapping(err.to_string())
    }
}

/// Rewrite every blank-node token `_:N` in the RDF text into the event-scoped IRI
/// `<http://{event_type}/{uuid}/{N}>`. All distinct tokens are substituted; longer
/// labels first so `_:1` never clips `_:12`.
pub fn rewrite_blank_nodes(rdf: &str, event_type: &str, event_uuid: &Uuid) -> String {
    let pattern = Regex::new("_:[0-9]*").unwrap();
    let mut labels: Vec<String> =
        pattern.find_iter(rdf).map(|m| m.as_str().to_string()).collect::<HashSet<_>>()
            .into_iter()
            .collect();
    labels.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let mut rewritten = rdf.to_string();
    for label in labels {
        let iri = format!("<http://{}/{}/{}>", event_type, event_uuid, &label[2..]);
        rewritten = rewritten.replace(&label, &iri);
    }
    rewritten
}

pub struct EventEnricher {
    event_types: EventTypeRegistry,
    mapping_engine: Arc<dyn MappingEngine>,
    schema_validator: Arc<dyn SchemaValidator>,
    shape_validator: Arc<dyn ShapeValidator>,
}

impl EventEnricher {
    pub fn new(
        event_types: EventTypeRegistry,
        mapping_engine: Arc<dyn MappingEngine>,
        schema_validator: Arc<dyn SchemaValidator>,
        shape_validator: Arc<dyn ShapeValidator>,
    ) -> Self {
        EventEnricher { event_types, mapping_engine, schema_validator, shape_validator }
    }

    /// Run the full pipeline for one submission.
    pub fn enrich(&self, event_json: &str, event_type: &str) -> Result<EnrichedEvent, EnrichError> {
        let resolved = self
            .event_types
            .get(event_type)
            .ok_or_else(|| EnrichError::EventTypeNotFound(event_type.to_string()))?;

        if let Some(schema) = &resolved.schema {
            let raw: Value = serde_json::from_str(event_json)
                .map_err(|e| EnrichError::InvalidJson(e.to_string()))?;
            self.schema_validator.validate(&raw, schema)?;
        }

        let mut node: Value = serde_json::from_str(event_json)
            .map_err(|e| EnrichError::InvalidJson(e.to_string()))?;
        let object = node
            .as_object_mut()
            .ok_or_else(|| EnrichError::InvalidJson("event is not a JSON object".to_string()))?;

        // Stamp the synthetic fields so generated nodes can be deterministically rewritten.
        let event_uuid = Uuid::new_v4();
        let recorded_time = epoch_secs();
        object.insert(EVENT_UUID_FIELD.to_string(), Value::String(event_uuid.to_string()));
        object.insert(EVENT_TYPE_FIELD.to_string(), Value::String(resolved.name.clone()));
        object.insert(EVENT_RECORDED_FIELD.to_string(), Value::from(recorded_time));

        let rdf = self.map(&node, &resolved.mapping)?;
        let event_rdf = rewrite_blank_nodes(&rdf, &resolved.name, &event_uuid);

        if resolved.shape.is_some() {
            self.shape_validator.validate(&event_rdf, &self.event_types.shape_docs())?;
        }

        let minimized_rdf = match (&resolved.minimal_mapping, resolved.minimize) {
            (Some(minimal), true) => {
                let stripped = self.map(&node, minimal)?;
                Some(rewrite_blank_nodes(&stripped, &resolved.name, &event_uuid))
            }
            _ => None,
        };

        let event_json = serde_json::to_string_pretty(&node)
            .map_err(|e| EnrichError::InvalidJson(e.to_string()))?;

        Ok(EnrichedEvent {
            event_json,
            event_type: resolved,
            event_uuid,
            event_rdf,
            minimized_rdf,
            recorded_time,
        })
    }

    fn map(&self, node: &Value, mapping_doc: &str) -> Result<String, EnrichError> {
        self.mapping_engine.map(node, mapping_doc)?.ok_or_else(|| {
            EnrichError::Mapping("Unable to map event to RDF, no output from mapping.".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_all_distinct_labels() {
        let uuid = Uuid::nil();
        let rdf = "_:0 <http://ex/p> _:1 .\n_:1 <http://ex/q> _:12 .";
        let out = rewrite_blank_nodes(rdf, "test.v1", &uuid);
        assert!(!out.contains("_:"));
        assert!(out.contains(&format!("<http://test.v1/{}/0>", uuid)));
        assert!(out.contains(&format!("<http://test.v1/{}/12>", uuid)));
    }
}
