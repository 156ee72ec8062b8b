//! HTTP surface of the node.
//!
//! Every handler stays thin: it delegates to a service and maps its error onto a
//! status code. The peer message endpoint authenticates with the pre-shared API key;
//! the rest of the surface is expected to sit behind the embedding API layer.

use crate::core::EventType;
use crate::delivery::inbound::{InboundMessageHandler, ReceiveOutcome};
use crate::distribution::{DistributionRule, DistributionRuleRegistry};
use crate::event::enricher::EnrichError;
use crate::event::service::{EventService, EventServiceError};
use crate::event::types::{EventTypeError, EventTypeRegistry};
use crate::ledger::message::{LedgerMessage, PeerEnvelope};
use crate::ledger::service::{MessageLedger, MessageView};
use crate::publication::webhook::{Webhook, WebhookRegistry};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    pub events: EventService,
    pub ledger: Arc<MessageLedger>,
    pub inbound: InboundMessageHandler,
    pub event_types: EventTypeRegistry,
    pub rules: DistributionRuleRegistry,
    pub webhooks: WebhookRegistry,
    /// Key expected on the peer message endpoint; `None` disables the check.
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    BadGateway(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<EventServiceError> for ApiError {
    fn from(err: EventServiceError) -> Self {
        match &err {
            EventServiceError::Enrich(EnrichError::EventTypeNotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            EventServiceError::Enrich(_) => ApiError::BadRequest(err.to_string()),
            EventServiceError::Distribution(_) => ApiError::InternalError(err.to_string()),
            EventServiceError::TripleStore(_) | EventServiceError::Ledger(_) => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<EventTypeError> for ApiError {
    fn from(err: EventTypeError) -> Self {
        match err {
            EventTypeError::NotFound(_) => ApiError::NotFound(err.to_string()),
            EventTypeError::AlreadyExists(_) | EventTypeError::InvalidDefinition(_) => {
                ApiError::BadRequest(err.to_string())
            }
        }
    }
}

/// Build the router with all routes.
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/events", post(submit_event))
        .route("/api/events/validate", post(validate_event))
        .route("/api/events/:id", get(get_event))
        .route("/api/events/:id/full-request", post(request_full_event))
        .route("/api/message", post(receive_message))
        .route("/api/message", get(list_messages))
        .route("/api/message/:id", get(get_message))
        .route("/api/event-types", post(register_event_type))
        .route("/api/event-types", get(list_event_types))
        .route("/api/event-types/:name", put(update_event_type))
        .route("/api/event-types/:name", delete(delete_event_type))
        .route("/api/distribution-rules", get(list_rules))
        .route("/api/distribution-rules", put(replace_rules))
        .route("/api/webhooks", post(register_webhook))
        .route("/api/webhooks", get(list_webhooks))
        .route("/api/webhooks/:client_id", delete(unregister_webhook))
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(SuccessResponse { message: "Hermes node is running".to_string() })
}

#[derive(Debug, Deserialize)]
struct SubmitParams {
    #[serde(rename = "eventType")]
    event_type: String,
    /// Optional ';'-separated peer identities; bypasses rule evaluation.
    destination: Option<String>,
}

#[derive(Debug, Serialize)]
struct EnrichedEventResponse {
    #[serde(rename = "eventUUID")]
    event_uuid: Uuid,
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(rename = "recordedTime")]
    recorded_time: u64,
    #[serde(rename = "eventRDF")]
    event_rdf: String,
}

/// POST /api/events - Enrich, store and distribute a JSON event submission.
async fn submit_event(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubmitParams>,
    body: String,
) -> Result<Json<EnrichedEventResponse>, ApiError> {
    let destinations = params.destination.map(|joined| {
        joined.split(';').filter(|d| !d.is_empty()).map(|d| d.to_string()).collect::<BTreeSet<_>>()
    });
    let event = state.events.submit_event(&body, &params.event_type, destinations).await?;
    Ok(Json(EnrichedEventResponse {
        event_uuid: event.event_uuid,
        event_type: event.event_type.name,
        recorded_time: event.recorded_time,
        event_rdf: event.event_rdf,
    }))
}

/// POST /api/events/validate - Run the enrichment pipeline without side effects.
async fn validate_event(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubmitParams>,
    body: String,
) -> Result<Json<EnrichedEventResponse>, ApiError> {
    let event = state.events.validate_event(&body, &params.event_type)?;
    Ok(Json(EnrichedEventResponse {
        event_uuid: event.event_uuid,
        event_type: event.event_type.name,
        recorded_time: event.recorded_time,
        event_rdf: event.event_rdf,
    }))
}

/// GET /api/events/:id - Fetch the stored triples of an event.
async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let results = state.events.fetch_event_by_uuid(id).await?;
    Ok(([("content-type", "application/sparql-results+json")], results).into_response())
}

#[derive(Debug, Deserialize)]
struct FullRequestBody {
    destinations: BTreeSet<String>,
}

/// POST /api/events/:id/full-request - Ask peers for the full version of an event.
async fn request_full_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<FullRequestBody>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let message_id = state.events.request_full_event(id, body.destinations).await?;
    Ok(Json(SuccessResponse { message: format!("Full event requested, message id: {}", message_id) }))
}

/// POST /api/message - Receive a new event or full-event request from a peer.
async fn receive_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(envelope): Json<PeerEnvelope>,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.api_key {
        let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return Err(ApiError::Unauthorized("invalid api key".to_string()));
        }
    }
    info!(message_id = %envelope.message_id, "received new message");
    match state.inbound.receive(envelope).await {
        ReceiveOutcome::Accepted => Ok(StatusCode::ACCEPTED.into_response()),
        ReceiveOutcome::NotFound => Err(ApiError::NotFound("unknown event".to_string())),
        ReceiveOutcome::Unauthorized => {
            Err(ApiError::Unauthorized("full event request denied".to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageParams {
    view: Option<String>,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_size")]
    size: usize,
}

fn default_page() -> usize {
    1
}

fn default_size() -> usize {
    25
}

/// GET /api/message - List ledger messages, newest first.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<LedgerMessage>>, ApiError> {
    if params.page < 1 {
        return Err(ApiError::BadRequest("Page should be greater than 0.".to_string()));
    }
    if params.size < 1 {
        return Err(ApiError::BadRequest("Page size should be greater than 0.".to_string()));
    }
    let view = match params.view.as_deref() {
        None => None,
        Some(raw) => Some(raw.parse::<MessageView>().map_err(ApiError::BadRequest)?),
    };
    Ok(Json(state.ledger.list_messages(view, params.page - 1, params.size)))
}

/// GET /api/message/:id - Fetch one ledger message by correlation id.
async fn get_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LedgerMessage>, ApiError> {
    state
        .ledger
        .find_message(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Message '{}' not found", id)))
}

/// POST /api/event-types - Register a new event type.
async fn register_event_type(
    State(state): State<Arc<AppState>>,
    Json(event_type): Json<EventType>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let name = event_type.name.clone();
    state.event_types.register(event_type)?;
    Ok(Json(SuccessResponse { message: format!("EventType '{}' registered", name) }))
}

/// GET /api/event-types - List the registered event types.
async fn list_event_types(State(state): State<Arc<AppState>>) -> Json<Vec<EventType>> {
    Json(state.event_types.list())
}

/// PUT /api/event-types/:name - Replace an event type definition.
async fn update_event_type(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(mut event_type): Json<EventType>,
) -> Result<Json<SuccessResponse>, ApiError> {
    event_type.name = name.clone();
    state.event_types.update(event_type)?;
    Ok(Json(SuccessResponse { message: format!("EventType '{}' updated", name) }))
}

/// DELETE /api/event-types/:name - Remove an event type.
async fn delete_event_type(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.event_types.remove(&name)?;
    Ok(Json(SuccessResponse { message: format!("EventType '{}' removed", name) }))
}

/// GET /api/distribution-rules - The ordered rule list.
async fn list_rules(State(state): State<Arc<AppState>>) -> Json<Vec<DistributionRule>> {
    Json(state.rules.list())
}

/// PUT /api/distribution-rules - Replace the ordered rule list.
async fn replace_rules(
    State(state): State<Arc<AppState>>,
    Json(rules): Json<Vec<DistributionRule>>,
) -> Json<SuccessResponse> {
    let count = rules.len();
    state.rules.replace(rules);
    Json(SuccessResponse { message: format!("{} distribution rules active", count) })
}

/// POST /api/webhooks - Register a callback.
async fn register_webhook(
    State(state): State<Arc<AppState>>,
    Json(webhook): Json<Webhook>,
) -> Json<SuccessResponse> {
    let client_id = webhook.client_id.clone();
    state.webhooks.register(webhook);
    Json(SuccessResponse { message: format!("Webhook registered for client '{}'", client_id) })
}

/// GET /api/webhooks - List the registered callbacks.
async fn list_webhooks(State(state): State<Arc<AppState>>) -> Json<Vec<Webhook>> {
    Json(state.webhooks.list())
}

/// DELETE /api/webhooks/:client_id - Remove every registration of a client.
async fn unregister_webhook(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if state.webhooks.unregister(&client_id) {
        Ok(Json(SuccessResponse { message: format!("Webhooks for client '{}' removed", client_id) }))
    } else {
        Err(ApiError::NotFound(format!("No webhooks registered for client '{}'", client_id)))
    }
}

/// Start the HTTP server on the given address.
pub async fn start_server(
    addr: &str,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Hermes node listening on http://{}", addr);
    println!();
    println!("Available endpoints:");
    println!("  POST   /api/events                  - Submit a JSON event");
    println!("  POST   /api/events/validate         - Validate a JSON event");
    println!("  GET    /api/events/:id              - Fetch stored event triples");
    println!("  POST   /api/events/:id/full-request - Request the full event from peers");
    println!("  POST   /api/message                 - Receive a peer message");
    println!("  GET    /api/message                 - List ledger messages");
    println!("  GET    /api/message/:id             - Fetch one ledger message");
    println!("  *      /api/event-types             - Manage event types");
    println!("  *      /api/distribution-rules      - Manage distribution rules");
    println!("  *      /api/webhooks                - Manage webhook registrations");
    println!("  GET    /health                      - Health check");
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}
