//! Webhook registrations and best-effort callback delivery.
//!
//! Every per-registration failure (token trouble, unreachable callback, 4xx/5xx) is
//! caught and logged independently; delivery never rolls back the ledger.

use crate::core::EventNotification;
use crate::publication::token::{TokenClient, TokenError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

/// A callback registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub client_id: String,
    /// Only notifications with exactly this event type are delivered.
    pub event_type: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    /// Static key sent as `X-API-KEY` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Token endpoint; bearer authentication is only attempted when present.
    #[serde(rename = "tokenURL", default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(rename = "refreshURL", default, skip_serializing_if = "Option::is_none")]
    pub refresh_url: Option<String>,
    /// Audience claim for the client-assertion JWT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

#[derive(Clone)]
pub struct WebhookRegistry {
    webhooks: Arc<RwLock<Vec<Webhook>>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        WebhookRegistry { webhooks: Arc::new(RwLock::new(Vec::new())) }
    }

    pub fn register(&self, webhook: Webhook) {
        info!(client_id = %webhook.client_id, event_type = %webhook.event_type, "new webhook registered");
        self.webhooks.write().unwrap().push(webhook);
    }

    /// Remove every registration of the client. Returns whether anything went away.
    pub fn unregister(&self, client_id: &str) -> bool {
        let mut webhooks = self.webhooks.write().unwrap();
        let before = webhooks.len();
        webhooks.retain(|w| w.client_id != client_id);
        webhooks.len() != before
    }

    pub fn list(&self) -> Vec<Webhook> {
        self.webhooks.read().unwrap().clone()
    }

    pub fn matching(&self, event_type: &str) -> Vec<Webhook> {
        self.webhooks.read().unwrap().iter().filter(|w| w.event_type == event_type).cloned().collect()
    }
}

#[derive(Debug)]
pub enum WebhookError {
    Token(TokenError),
    Callback(String),
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookError::Token(err) => write!(f, "{}", err),
            WebhookError::Callback(msg) => write!(f, "Unable to reach callback: {}", msg),
        }
    }
}

impl std::error::Error for WebhookError {}

impl From<TokenError> for WebhookError {
    fn from(err: TokenError) -> Self {
        WebhookError::Token(err)
    }
}

pub struct WebhookNotifier {
    registry: WebhookRegistry,
    tokens: TokenClient,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(registry: WebhookRegistry, tokens: TokenClient) -> Self {
        WebhookNotifier { registry, tokens, client: reqwest::Client::new() }
    }

    /// Deliver one notification to every matching registration, best effort.
    pub async fn handle(&self, notification: &EventNotification) {
        info!(
            event_type = %notification.event_type,
            event_uuid = %notification.event_uuid,
            "event received for publication"
        );
        let matching = self.registry.matching(&notification.event_type);
        info!(count = matching.len(), event_type = %notification.event_type, "webhooks registered for event type");
        for webhook in matching {
            if let Err(err) = self.send(notification, &webhook).await {
                warn!(
                    client_id = %webhook.client_id,
                    event_uuid = %notification.event_uuid,
                    error = %err,
                    "unable to notify webhook"
                );
            }
        }
    }

    async fn send(
        &self,
        notification: &EventNotification,
        webhook: &Webhook,
    ) -> Result<(), WebhookError> {
        info!(
            event_type = %notification.event_type,
            event_uuid = %notification.event_uuid,
            callback = %webhook.callback_url,
            "sending event notification"
        );
        let mut request = self
            .client
            .post(&webhook.callback_url)
            .header("Location", format!("/api/events/{}", notification.event_uuid))
            .json(notification);
        if webhook.token_url.is_some() {
            let bearer = self.tokens.bearer_for(webhook).await?;
            request = request.bearer_auth(bearer);
        }
        if let Some(api_key) = &webhook.api_key {
            request = request.header("X-API-KEY", api_key);
        }

        let response =
            request.send().await.map_err(|e| WebhookError::Callback(e.to_string()))?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            // Best effort: a refusing callback is noted, nothing more.
            warn!(callback = %webhook.callback_url, %status, "sending event to callback failed");
        }
        Ok(())
    }

    /// Drain the notification channel until every sender is gone.
    pub async fn run(self, mut notifications: UnboundedReceiver<EventNotification>) {
        while let Some(notification) = notifications.recv().await {
            self.handle(&notification).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(client_id: &str, event_type: &str) -> Webhook {
        Webhook {
            client_id: client_id.to_string(),
            event_type: event_type.to_string(),
            callback_url: "http://callback.example/events".to_string(),
            api_key: None,
            token_url: None,
            refresh_url: None,
            audience: None,
        }
    }

    #[test]
    fn matching_filters_on_event_type() {
        let registry = WebhookRegistry::new();
        registry.register(hook("a", "federated.arrival"));
        registry.register(hook("b", "federated.discharge"));
        registry.register(hook("c", "federated.arrival"));

        let matched = registry.matching("federated.arrival");
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|w| w.event_type == "federated.arrival"));
    }

    #[test]
    fn unregister_removes_all_registrations_of_a_client() {
        let registry = WebhookRegistry::new();
        registry.register(hook("a", "federated.arrival"));
        registry.register(hook("a", "federated.discharge"));
        assert!(registry.unregister("a"));
        assert!(registry.list().is_empty());
        assert!(!registry.unregister("a"));
    }
}
