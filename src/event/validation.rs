//! Submission validation: JSON-Schema on the raw JSON, shape constraints on the mapped RDF.
//!
//! Both validators are black-box capabilities behind traits. The defaults are a
//! `jsonschema`-backed schema validator and a shape validator that evaluates named
//! SPARQL ASK constraints with oxigraph over a throwaway in-memory graph, the same
//! mechanism the distribution-rule engine uses.

use oxigraph::io::RdfFormat;
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Schema validation failure carrying every field-level violation.
#[derive(Debug)]
pub struct SchemaValidationError {
    pub violations: Vec<String>,
}

impl fmt::Display for SchemaValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "The JSON event provided does not match the required definition:")?;
        for violation in &self.violations {
            writeln!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaValidationError {}

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, json: &Value, schema: &str) -> Result<(), SchemaValidationError>;
}

/// `jsonschema`-backed validator. Collects all violations instead of stopping at the first.
pub struct JsonSchemaValidator;

impl JsonSchemaValidator {
    pub fn new() -> Self {
        JsonSchemaValidator
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, json: &Value, schema: &str) -> Result<(), SchemaValidationError> {
        let schema_value: Value = serde_json::from_str(schema).map_err(|e| {
            SchemaValidationError { violations: vec![format!("invalid schema document: {}", e)] }
        })?;
        let validator = jsonschema::validator_for(&schema_value).map_err(|e| {
            SchemaValidationError { violations: vec![format!("invalid schema document: {}", e)] }
        })?;

        let violations: Vec<String> = validator
            .iter_errors(json)
            .map(|error| format!("{} - {}", error, error.instance_path))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaValidationError { violations })
        }
    }
}

#[derive(Debug)]
pub enum ShapeValidationError {
    /// The RDF violates one or more shape constraints; the report lists all of them.
    Violations(Vec<String>),
    /// The validation machinery itself failed (unparsable RDF or shape document).
    Engine(String),
}

impl fmt::Display for ShapeValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeValidationError::Violations(report) => {
                writeln!(f, "Shape validation failed:")?;
                for entry in report {
                    writeln!(f, "{}", entry)?;
                }
                Ok(())
            }
            ShapeValidationError::Engine(msg) => write!(f, "Shape validation error: {}", msg),
        }
    }
}

impl std::error::Error for ShapeValidationError {}

/// Validates RDF text against the union of all supplied shape documents.
pub trait ShapeValidator: Send + Sync {
    fn validate(&self, rdf: &str, shapes: &[String]) -> Result<(), ShapeValidationError>;
}

#[derive(Debug, Deserialize)]
struct ShapeDoc {
    constraints: Vec<ShapeConstraint>,
}

/// A single constraint: the ASK query answers `true` when the graph violates it.
#[derive(Debug, Deserialize)]
struct ShapeConstraint {
    message: String,
    ask: String,
}

/// Shape validator over SPARQL ASK constraints, evaluated on a throwaway in-memory graph.
pub struct SparqlShapeValidator;

impl SparqlShapeValidator {
    pub fn new() -> Self {
        SparqlShapeValidator
    }
}

impl ShapeValidator for SparqlShapeValidator {
    fn validate(&self, rdf: &str, shapes: &[String]) -> Result<(), ShapeValidationError> {
        if shapes.is_empty() {
            return Ok(());
        }

        let store = Store::new().map_err(|e| ShapeValidationError::Engine(e.to_string()))?;
        store
            .load_from_reader(RdfFormat::Turtle, rdf.as_bytes())
            .map_err(|e| ShapeValidationError::Engine(e.to_string()))?;

        let mut report = Vec::new();
        for shape in shapes {
            let doc: ShapeDoc = serde_json::from_str(shape)
                .map_err(|e| ShapeValidationError::Engine(format!("invalid shape document: {}", e)))?;
            for constraint in &doc.constraints {
                if ask(&store, &constraint.ask)? {
                    report.push(constraint.message.clone());
                }
            }
        }

        if report.is_empty() {
            Ok(())
        } else {
            Err(ShapeValidationError::Violations(report))
        }
    }
}

fn ask(store: &Store, query: &str) -> Result<bool, ShapeValidationError> {
    let evaluator = SparqlEvaluator::new();
    let parsed =
        evaluator.parse_query(query).map_err(|e| ShapeValidationError::Engine(e.to_string()))?;
    let results = parsed
        .on_store(store)
        .execute()
        .map_err(|e| ShapeValidationError::Engine(e.to_string()))?;
    match results {
        QueryResults::Boolean(answer) => Ok(answer),
        _ => Err(ShapeValidationError::Engine(
            "shape constraint must be a boolean (ASK) query".to_string(),
        )),
    }
}
