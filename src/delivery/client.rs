//! Outbound delivery to the peer message endpoint.

use crate::ledger::message::PeerEnvelope;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum DeliveryError {
    /// The peer could not be reached at all (no endpoint configured, connect or IO failure).
    Unreachable(String),
    /// The peer answered with a non-success status. 4xx and 5xx are surfaced uniformly;
    /// the distinction only shows up in the logs.
    Rejected { status: u16, body: String },
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Unreachable(msg) => write!(f, "Unable to reach peer endpoint: {}", msg),
            DeliveryError::Rejected { status, body } => {
                write!(f, "Peer rejected message: {} : {}", status, body)
            }
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Transport seam: pushes one wire envelope to the peer message endpoint.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, envelope: &PeerEnvelope) -> Result<(), DeliveryError>;
}

pub struct HttpDeliveryClient {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: String,
}

impl HttpDeliveryClient {
    pub fn new(
        endpoint: Option<String>,
        api_key: String,
        connect_timeout: Duration,
        socket_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(socket_timeout)
            .build()
            .expect("HTTP client construction cannot fail with static options");
        HttpDeliveryClient { client, endpoint, api_key }
    }
}

#[async_trait]
impl MessageTransport for HttpDeliveryClient {
    async fn send(&self, envelope: &PeerEnvelope) -> Result<(), DeliveryError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| DeliveryError::Unreachable("no peer endpoint configured".to_string()))?;

        debug!(message_id = %envelope.message_id, endpoint, "sending message to peer");
        let response = self
            .client
            .post(endpoint)
            .header("x-api-key", &self.api_key)
            .json(envelope)
            .send()
            .await
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, endpoint, "peer refused message");
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, endpoint, "peer failed to process message");
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }
        debug!(message_id = %envelope.message_id, "message delivered");
        Ok(())
    }
}
