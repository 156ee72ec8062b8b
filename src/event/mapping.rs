//! JSON→RDF mapping.
//!
//! The mapping engine is a black-box capability behind the [`MappingEngine`] trait:
//! it takes a JSON document and a declarative mapping document and produces RDF text,
//! or nothing when no rule yields a triple. The default [`TemplateMapper`] consumes a
//! JSON mapping document of ordered entity blocks:
//!
//! ```json
//! {
//!   "entities": [
//!     {
//!       "node": "_:0",
//!       "type": "https://ontology.example.org/logistics#Event",
//!       "properties": [
//!         { "field": "weight", "predicate": "https://ontology.example.org/logistics#grossWeight",
//!           "datatype": "http://www.w3.org/2001/XMLSchema#decimal" },
//!         { "field": "UUID", "predicate": "https://ontology.example.org/logistics#eventUUID" },
//!         { "ref": "_:1", "predicate": "https://ontology.example.org/logistics#involves" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `node` is a blank-node label (`_:N`) or an IRI; `field` looks up a dotted path in
//! the submission and is skipped when absent; `value` emits a constant literal; `ref`
//! links to another node. Output is N-Triples text (a Turtle subset), blank-node
//! labels intact so the enricher can rewrite them into event-scoped IRIs.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug)]
pub enum MappingEngineError {
    /// The mapping document itself could not be parsed.
    InvalidDocument(String),
}

impl fmt::Display for MappingEngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingEngineError::InvalidDocument(msg) => {
                write!(f, "Invalid mapping document: {}", msg)
            }
        }
    }
}

impl std::error::Error for MappingEngineError {}

/// Converts a JSON document into RDF text according to a mapping document.
///
/// Returns `Ok(None)` when the mapping produced no triples at all.
pub trait MappingEngine: Send + Sync {
    fn map(&self, json: &Value, mapping_doc: &str) -> Result<Option<String>, MappingEngineError>;
}

#[derive(Debug, Deserialize)]
struct MappingDoc {
    entities: Vec<EntityRule>,
}

#[derive(Debug, Deserialize)]
struct EntityRule {
    node: String,
    #[serde(rename = "type")]
    rdf_type: Option<String>,
    #[serde(default)]
    properties: Vec<PropertyRule>,
}

#[derive(Debug, Deserialize)]
struct PropertyRule {
    predicate: String,
    field: Option<String>,
    value: Option<String>,
    #[serde(rename = "ref")]
    node_ref: Option<String>,
    datatype: Option<String>,
}

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Default template-driven mapping engine.
pub struct TemplateMapper;

impl TemplateMapper {
    pub fn new() -> Self {
        TemplateMapper
    }
}

impl MappingEngine for TemplateMapper {
    fn map(&self, json: &Value, mapping_doc: &str) -> Result<Option<String>, MappingEngineError> {
        let doc: MappingDoc = serde_json::from_str(mapping_doc)
            .map_err(|e| MappingEngineError::InvalidDocument(e.to_string()))?;

        let mut triples = Vec::new();
        for entity in &doc.entities {
            let subject = render_term(&entity.node);
            if let Some(rdf_type) = &entity.rdf_type {
                triples.push(format!("{} <{}> <{}> .", subject, RDF_TYPE, rdf_type));
            }
            for property in &entity.properties {
                if let Some(object) = render_object(property, json) {
                    triples.push(format!("{} <{}> {} .", subject, property.predicate, object));
                }
            }
        }

        if triples.is_empty() {
            return Ok(None);
        }
        Ok(Some(triples.join("\n")))
    }
}

fn render_object(property: &PropertyRule, json: &Value) -> Option<String> {
    if let Some(target) = &property.node_ref {
        return Some(render_term(target));
    }
    if let Some(constant) = &property.value {
        return Some(render_literal(constant, property.datatype.as_deref()));
    }
    let field = property.field.as_deref()?;
    let value = lookup(json, field)?;
    let lexical = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Arrays, objects and nulls have no literal form; the rule simply does not fire.
        _ => return None,
    };
    Some(render_literal(&lexical, property.datatype.as_deref()))
}

/// Resolve a dotted path like `consignment.weight` in the submission.
fn lookup<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = json;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn render_term(node: &str) -> String {
    if node.starts_with("_:") {
        node.to_string()
    } else {
        format!("<{}>", node)
    }
}

fn render_literal(lexical: &str, datatype: Option<&str>) -> String {
    let escaped = escape_literal(lexical);
    match datatype {
        Some(dt) => format!("\"{}\"^^<{}>", escaped, dt),
        None => format!("\"{}\"", escaped),
    }
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}
