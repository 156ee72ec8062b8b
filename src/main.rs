//! Hermes - a federated logistics-event node.
//!
//! This is the server entry point: it loads the configuration, wires the services
//! together, spawns the periodic tasks and serves the HTTP surface.

use clap::Parser;
use hermes::config::NodeConfig;
use hermes::delivery::client::HttpDeliveryClient;
use hermes::delivery::inbound::InboundMessageHandler;
use hermes::distribution::{DistributionRuleEngine, DistributionRuleRegistry};
use hermes::event::enricher::EventEnricher;
use hermes::event::mapping::{MappingEngine, TemplateMapper};
use hermes::event::service::EventService;
use hermes::event::types::EventTypeRegistry;
use hermes::event::validation::{JsonSchemaValidator, SparqlShapeValidator};
use hermes::http::server::{start_server, AppState};
use hermes::ledger::service::MessageLedger;
use hermes::ledger::store::InMemoryLedgerStore;
use hermes::publication::observer::EventPublicationObserver;
use hermes::publication::token::TokenClient;
use hermes::publication::webhook::{WebhookNotifier, WebhookRegistry};
use hermes::retention::RetentionCleaner;
use hermes::triplestore::{HttpTripleStore, MemoryTripleStore, TripleStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hermes", about = "Federated logistics-event node")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overriding the configuration.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "hermes=info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    let listen_addr = args.listen.clone().unwrap_or_else(|| config.node.listen_addr.clone());

    println!("Hermes - federated logistics-event node");
    println!("Node identity: {}", config.node.identity);

    // Capability seams and registries.
    let mapping_engine: Arc<dyn MappingEngine> = Arc::new(TemplateMapper::new());
    let event_types = EventTypeRegistry::new();
    let rules = DistributionRuleRegistry::new();
    let webhooks = WebhookRegistry::new();

    let connect_timeout = Duration::from_millis(config.triplestore.connect_timeout_millis);
    let socket_timeout = Duration::from_millis(config.triplestore.socket_timeout_millis);
    let triple_store: Arc<dyn TripleStore> = match &config.triplestore.endpoint {
        Some(endpoint) => {
            println!("Triple store: {}", endpoint);
            Arc::new(HttpTripleStore::new(endpoint.clone(), connect_timeout, socket_timeout))
        }
        None => {
            println!("Triple store: in-memory");
            Arc::new(MemoryTripleStore::new()?)
        }
    };

    let transport = Arc::new(HttpDeliveryClient::new(
        config.peer.endpoint.clone(),
        config.peer.api_key.clone(),
        connect_timeout,
        socket_timeout,
    ));
    let store = Arc::new(InMemoryLedgerStore::new());
    let ledger = Arc::new(MessageLedger::new(store.clone(), transport));

    let enricher = EventEnricher::new(
        event_types.clone(),
        Arc::clone(&mapping_engine),
        Arc::new(JsonSchemaValidator::new()),
        Arc::new(SparqlShapeValidator::new()),
    );
    let events = EventService::new(
        enricher,
        DistributionRuleEngine::new(rules.clone()),
        Arc::clone(&ledger),
        Arc::clone(&triple_store),
    );
    let inbound = InboundMessageHandler::new(
        Arc::clone(&ledger),
        Arc::clone(&triple_store),
        event_types.clone(),
        Arc::clone(&mapping_engine),
    );

    // Publication pipeline: observer polls the ledger and feeds the notifier.
    let (notification_tx, notification_rx) = mpsc::unbounded_channel();
    let observer = EventPublicationObserver::new(
        store.clone(),
        notification_tx,
        config.observer.page_size,
    );
    let notifier = WebhookNotifier::new(
        webhooks.clone(),
        TokenClient::new(config.webhook.signing_key.clone()),
    );
    tokio::spawn(observer.run(
        Duration::from_secs(config.observer.initial_delay_secs),
        Duration::from_secs(config.observer.poll_interval_secs),
    ));
    tokio::spawn(notifier.run(notification_rx));

    let cleaner = RetentionCleaner::new(event_types.clone(), store.clone(), Arc::clone(&triple_store));
    tokio::spawn(cleaner.run(Duration::from_secs(config.retention.sweep_interval_secs)));

    let state = Arc::new(AppState {
        events,
        ledger,
        inbound,
        event_types,
        rules,
        webhooks,
        api_key: config.node.api_key.clone(),
    });

    start_server(&listen_addr, state).await
}
