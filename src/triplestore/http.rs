//! HTTP client for a GraphDB-style SPARQL repository.

use crate::triplestore::{TripleStore, TripleStoreError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub struct HttpTripleStore {
    client: reqwest::Client,
    /// Repository URL, e.g. `http://graphdb:7200/repositories/events`.
    repository: String,
}

impl HttpTripleStore {
    pub fn new(repository: String, connect_timeout: Duration, socket_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(socket_timeout)
            .build()
            .expect("HTTP client construction cannot fail with static options");
        HttpTripleStore { client, repository }
    }

    fn statements_url(&self) -> String {
        format!("{}/statements", self.repository)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TripleStoreError> {
        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TripleStoreError::Client(format!("{} : {}", status, body)));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TripleStoreError::Server(format!("{} : {}", status, body)));
        }
        Ok(response)
    }
}

#[async_trait]
impl TripleStore for HttpTripleStore {
    async fn insert(&self, turtle: &str) -> Result<(), TripleStoreError> {
        debug!(repository = %self.repository, "inserting triples");
        let response = self
            .client
            .post(self.statements_url())
            .header("Content-Type", "text/turtle")
            .body(turtle.to_string())
            .send()
            .await
            .map_err(|e| TripleStoreError::Connection(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn query(&self, sparql: &str) -> Result<String, TripleStoreError> {
        let response = self
            .client
            .get(&self.repository)
            .query(&[("query", sparql)])
            .header("Accept", "application/sparql-results+json")
            .send()
            .await
            .map_err(|e| TripleStoreError::Connection(e.to_string()))?;
        let response = Self::check(response).await?;
        response.text().await.map_err(|e| TripleStoreError::Connection(e.to_string()))
    }

    async fn update(&self, sparql: &str) -> Result<(), TripleStoreError> {
        debug!(repository = %self.repository, "executing update");
        let response = self
            .client
            .post(self.statements_url())
            .header("Content-Type", "application/sparql-update")
            .body(sparql.to_string())
            .send()
            .await
            .map_err(|e| TripleStoreError::Connection(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}
