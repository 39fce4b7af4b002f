use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use monitoring_cell::{
    create_monitoring_router, AlertLifecycleManager, EvaluationDispatcher, EventBus,
    MonitoringHandlers, SlackNotifier,
};
use probe_cell::{create_probe_router, ProbeClient, ProbeHandlers};
use shared_config::AppConfig;
use shared_database::{InMemoryStore, MonitorStore};
use stream_cell::{create_stream_router, StreamHub};

/// Long-lived services shared by every route.
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn MonitorStore>,
    pub bus: EventBus,
    pub dispatcher: Arc<EvaluationDispatcher>,
    pub hub: Arc<StreamHub>,
}

impl AppServices {
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let store: Arc<dyn MonitorStore> = Arc::new(InMemoryStore::new());
        let bus = EventBus::new();
        let notifier = Arc::new(SlackNotifier::from_config(&config));
        let manager = Arc::new(AlertLifecycleManager::new(store.clone(), bus.clone(), notifier));
        let dispatcher = Arc::new(EvaluationDispatcher::new(manager));
        let hub = Arc::new(StreamHub::from_config(bus.clone(), &config));

        Self {
            config,
            store,
            bus,
            dispatcher,
            hub,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(services: &AppServices) -> Router {
    let monitoring = Arc::new(MonitoringHandlers::new(
        services.config.clone(),
        services.store.clone(),
        services.bus.clone(),
        services.dispatcher.clone(),
    ));

    // manual probes enter the same ingestion path as pushed metrics
    let ingest = Arc::new(monitoring_cell::IngestService::new(
        services.store.clone(),
        services.bus.clone(),
        services.dispatcher.clone(),
    ));
    let probes = Arc::new(ProbeHandlers::new(services.store.clone(), ProbeClient::new(), ingest));

    let v1 = Router::new()
        .route("/health", get(health))
        .merge(create_monitoring_router(monitoring))
        .merge(create_stream_router(services.hub.clone()))
        .merge(create_probe_router(probes));

    Router::new()
        .route("/", get(|| async { "API monitor is running" }))
        .nest("/v1", v1)
}
