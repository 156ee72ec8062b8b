//! Bearer-token plumbing for webhook callbacks.
//!
//! Tokens are cached per token endpoint with a reset-on-restart lifecycle. A token
//! counts as expired when the `exp` claim of its JWT payload has passed; acquisition
//! authenticates with an RS256 client-assertion JWT signed by the node key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::core::epoch_secs;
use crate::publication::webhook::Webhook;

#[derive(Debug)]
pub enum TokenError {
    /// No signing key configured, so no client assertion can be produced.
    MissingKey,
    Jwt(String),
    Acquire(String),
    Refresh(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::MissingKey => write!(f, "No webhook signing key configured"),
            TokenError::Jwt(msg) => write!(f, "Unable to create JWT: {}", msg),
            TokenError::Acquire(msg) => write!(f, "Unable to acquire access token: {}", msg),
            TokenError::Refresh(msg) => write!(f, "Unable to refresh access token: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

/// A cached access token, keyed by its token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Decoded `exp` claim, epoch seconds. Absent when the token carries none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    iat: u64,
}

/// Extract the `exp` claim from a JWT without verifying its signature.
///
/// The token was just handed to us by the issuer; the claim is only used to decide
/// when to come back for a fresh one.
pub fn decode_expiry(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_u64()
}

/// Whether the token's `exp` claim has passed. Tokens without a readable claim are
/// treated as expired.
pub fn is_expired(token: &AccessToken) -> bool {
    match token.expiry.or_else(|| decode_expiry(&token.token)) {
        Some(exp) => epoch_secs() >= exp,
        None => true,
    }
}

pub struct TokenClient {
    client: reqwest::Client,
    /// PEM-encoded RSA private key for client assertions.
    signing_key: Option<String>,
    tokens: RwLock<HashMap<String, AccessToken>>,
}

impl TokenClient {
    pub fn new(signing_key: Option<String>) -> Self {
        TokenClient {
            client: reqwest::Client::new(),
            signing_key,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Produce a bearer token for the webhook's token endpoint, reusing the cache,
    /// acquiring on a miss and refreshing first when the cached token expired.
    pub async fn bearer_for(&self, webhook: &Webhook) -> Result<String, TokenError> {
        let token_url = webhook
            .token_url
            .as_deref()
            .ok_or_else(|| TokenError::Acquire("webhook has no token endpoint".to_string()))?;

        let cached = self.tokens.read().unwrap().get(token_url).cloned();
        let token = match cached {
            Some(token) if !is_expired(&token) => token,
            Some(expired) => {
                debug!(token_url, "cached access token expired, refreshing");
                let renewed = self.renew(webhook, &expired).await?;
                self.cache(token_url, renewed.clone());
                renewed
            }
            None => {
                debug!(token_url, "no cached access token, acquiring");
                let acquired = self.acquire(webhook).await?;
                self.cache(token_url, acquired.clone());
                acquired
            }
        };
        Ok(token.token)
    }

    fn cache(&self, token_url: &str, mut token: AccessToken) {
        token.expiry = token.expiry.or_else(|| decode_expiry(&token.token));
        self.tokens.write().unwrap().insert(token_url.to_string(), token);
    }

    async fn acquire(&self, webhook: &Webhook) -> Result<AccessToken, TokenError> {
        let token_url = webhook
            .token_url
            .as_deref()
            .ok_or_else(|| TokenError::Acquire("webhook has no token endpoint".to_string()))?;
        let audience = webhook
            .audience
            .as_deref()
            .ok_or_else(|| TokenError::Acquire("webhook has no audience configured".to_string()))?;
        let assertion = self.client_assertion(&webhook.client_id, audience)?;

        let response = self
            .client
            .post(token_url)
            .header("clientid", &webhook.client_id)
            .bearer_auth(assertion)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| TokenError::Acquire(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TokenError::Acquire(response.status().to_string()));
        }
        response.json::<AccessToken>().await.map_err(|e| TokenError::Acquire(e.to_string()))
    }

    /// Refresh through the refresh endpoint when one is configured, else re-acquire.
    async fn renew(
        &self,
        webhook: &Webhook,
        current: &AccessToken,
    ) -> Result<AccessToken, TokenError> {
        let refresh_url = match webhook.refresh_url.as_deref() {
            Some(url) => url,
            None => return self.acquire(webhook).await,
        };
        let body = serde_json::json!({
            "refreshToken": current.refresh_token,
            "grantType": "refreshToken",
        });
        let response = self
            .client
            .post(refresh_url)
            .header("clientid", &webhook.client_id)
            .bearer_auth(&current.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TokenError::Refresh(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TokenError::Refresh(response.status().to_string()));
        }
        let refreshed = response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| TokenError::Refresh(e.to_string()))?;
        Ok(AccessToken {
            token: refreshed.token,
            refresh_token: current.refresh_token.clone(),
            expiry: None,
        })
    }

    fn client_assertion(&self, client_id: &str, audience: &str) -> Result<String, TokenError> {
        let pem = self.signing_key.as_deref().ok_or(TokenError::MissingKey)?;
        let key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| TokenError::Jwt(e.to_string()))?;
        let claims = AssertionClaims {
            iss: client_id.to_string(),
            sub: Uuid::new_v4().to_string(),
            aud: audience.to_string(),
            iat: epoch_secs(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| TokenError::Jwt(e.to_string()))
    }
}
