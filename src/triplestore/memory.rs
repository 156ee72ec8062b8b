//! In-memory triple store backed by oxigraph, for standalone nodes and tests.

use crate::triplestore::{TripleStore, TripleStoreError};
use async_trait::async_trait;
use oxigraph::io::RdfFormat;
use oxigraph::sparql::results::{QueryResultsFormat, QueryResultsSerializer};
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;

pub struct MemoryTripleStore {
    store: Store,
}

impl MemoryTripleStore {
    pub fn new() -> Result<Self, TripleStoreError> {
        let store = Store::new().map_err(|e| TripleStoreError::Server(e.to_string()))?;
        Ok(MemoryTripleStore { store })
    }
}

#[async_trait]
impl TripleStore for MemoryTripleStore {
    async fn insert(&self, turtle: &str) -> Result<(), TripleStoreError> {
        self.store
            .load_from_reader(RdfFormat::Turtle, turtle.as_bytes())
            .map_err(|e| TripleStoreError::Client(e.to_string()))
    }

    async fn query(&self, sparql: &str) -> Result<String, TripleStoreError> {
        let evaluator = SparqlEvaluator::new();
        let parsed =
            evaluator.parse_query(sparql).map_err(|e| TripleStoreError::Client(e.to_string()))?;
        let results = parsed
            .on_store(&self.store)
            .execute()
            .map_err(|e| TripleStoreError::Server(e.to_string()))?;
        let buffer = results
            .write(Vec::new(), QueryResultsFormat::Json)
            .map_err(|e| TripleStoreError::Server(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TripleStoreError::Server(e.to_string()))
    }

    async fn update(&self, sparql: &str) -> Result<(), TripleStoreError> {
        let evaluator = SparqlEvaluator::new();
        let parsed =
            evaluator.parse_update(sparql).map_err(|e| TripleStoreError::Client(e.to_string()))?;
        parsed
            .on_store(&self.store)
            .execute()
            .map_err(|e| TripleStoreError::Server(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triplestore::{event_delete_query, event_select_query};

    #[tokio::test]
    async fn insert_query_delete_cycle() {
        let store = MemoryTripleStore::new().unwrap();
        store
            .insert("<http://test.v1/abc/0> <http://ex/weight> \"10\" .")
            .await
            .unwrap();

        let results = store.query(&event_select_query("test.v1/abc/")).await.unwrap();
        assert!(results.contains("weight"));

        store.update(&event_delete_query("test.v1/abc/")).await.unwrap();
        let results = store.query(&event_select_query("test.v1/abc/")).await.unwrap();
        assert!(!results.contains("weight"));
    }
}
