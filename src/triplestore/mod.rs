//! Triple-store boundary.
//!
//! The node only needs three operations from its RDF store: insert Turtle, run a
//! SPARQL SELECT, run a SPARQL update that deletes. Storage itself is fully
//! delegated: the HTTP client talks to a GraphDB-style repository endpoint, the
//! memory store backs standalone nodes and tests with oxigraph.

use async_trait::async_trait;
use std::fmt;

mod http;
mod memory;

pub use http::HttpTripleStore;
pub use memory::MemoryTripleStore;

#[derive(Debug)]
pub enum TripleStoreError {
    /// The store rejected the request (4xx, unparsable input).
    Client(String),
    /// The store failed to process the request (5xx, engine failure).
    Server(String),
    /// The store could not be reached.
    Connection(String),
}

impl fmt::Display for TripleStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripleStoreError::Client(msg) => write!(f, "Triple store rejected request: {}", msg),
            TripleStoreError::Server(msg) => write!(f, "Triple store error: {}", msg),
            TripleStoreError::Connection(msg) => {
                write!(f, "Unable to reach triple store: {}", msg)
            }
        }
    }
}

impl std::error::Error for TripleStoreError {}

#[async_trait]
pub trait TripleStore: Send + Sync {
    /// Insert Turtle text into the store.
    async fn insert(&self, turtle: &str) -> Result<(), TripleStoreError>;

    /// Evaluate a SELECT query; the result is the SPARQL JSON results document.
    async fn query(&self, sparql: &str) -> Result<String, TripleStoreError>;

    /// Execute a SPARQL update (used for scoped deletes).
    async fn update(&self, sparql: &str) -> Result<(), TripleStoreError>;
}

/// SELECT returning every triple whose subject matches the scope: an event IRI
/// prefix `{event_type}/{uuid}/`, or the bare UUID.
pub fn event_select_query(scope: &str) -> String {
    format!(
        "SELECT ?s ?p ?o WHERE {{ ?s ?p ?o . FILTER regex(STR(?s), \"{}\") }}",
        scope
    )
}

/// DELETE for every triple whose subject or object sits under the event IRI prefix.
pub fn event_delete_query(iri_prefix: &str) -> String {
    format!(
        "DELETE {{ ?s ?p ?o }} WHERE {{ ?s ?p ?o . FILTER(regex(STR(?s), \"{0}\") || regex(STR(?o), \"{0}\")) }}",
        iri_prefix
    )
}
