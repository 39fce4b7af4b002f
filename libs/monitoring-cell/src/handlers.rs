// =====================================================================================
// MONITORING CELL HANDLERS
// =====================================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument};

use shared_config::AppConfig;
use shared_database::{AlertFilter, MonitorStore, TargetUpdate};
use shared_models::{Alert, AlertState, AppError, Metric, Rule, RuleKind, Target};
use shared_utils::validation::{
    validate_http_url, validate_identifier, validate_length, validate_range, validate_status_code,
    validate_status_codes,
};

use crate::models::{
    AlertsQuery, CreateRuleRequest, CreateTargetRequest, IngestAccepted, IngestMetricRequest,
    MetricsQuery, MonitoringError, RuleQuery, ToggleRuleRequest, UpdateTargetRequest,
    DEFAULT_METRICS_LIMIT,
};
use crate::services::{EvaluationDispatcher, EventBus, IngestService};

const MIN_PROBE_INTERVAL_SECS: i64 = 5;
const MAX_METRICS_LIMIT: usize = 500;

pub struct MonitoringHandlers {
    config: Arc<AppConfig>,
    store: Arc<dyn MonitorStore>,
    ingest: IngestService,
}

impl MonitoringHandlers {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn MonitorStore>,
        bus: EventBus,
        dispatcher: Arc<EvaluationDispatcher>,
    ) -> Self {
        let ingest = IngestService::new(store.clone(), bus, dispatcher);
        Self {
            config,
            store,
            ingest,
        }
    }

    pub fn ingest_service(&self) -> &IngestService {
        &self.ingest
    }
}

// =====================================================================================
// TARGETS
// =====================================================================================

#[instrument(skip(handlers, request), fields(api_id = %request.api_id))]
pub async fn create_target(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Json(request): Json<CreateTargetRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_identifier("api_id", &request.api_id, 3, 50)?;
    validate_length("name", &request.name, 1, 200)?;
    validate_http_url("base_url", &request.base_url)?;

    let probe_interval = match request.probe_interval {
        Some(secs) => validate_range("probe_interval", secs, MIN_PROBE_INTERVAL_SECS, i64::MAX)? as u64,
        None => handlers.config.probe_default_interval_secs,
    };
    let expected_status = match request.expected_status {
        Some(codes) => validate_status_codes("expected_status", &codes)?,
        None => vec![200],
    };

    let target = handlers
        .store
        .insert_target(Target {
            api_id: request.api_id,
            name: request.name,
            base_url: request.base_url,
            probe_interval,
            expected_status,
            created_at: Utc::now(),
        })
        .await?;

    info!(api_id = %target.api_id, base_url = %target.base_url, "Target registered");
    Ok((StatusCode::CREATED, Json(target)))
}

pub async fn list_targets(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Result<Json<Vec<Target>>, AppError> {
    Ok(Json(handlers.store.list_targets().await?))
}

pub async fn get_target(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Path(api_id): Path<String>,
) -> Result<Json<Target>, AppError> {
    let target = handlers
        .store
        .get_target(&api_id)
        .await?
        .ok_or(MonitoringError::TargetNotFound(api_id))?;
    Ok(Json(target))
}

#[instrument(skip(handlers, request))]
pub async fn update_target(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Path(api_id): Path<String>,
    Json(request): Json<UpdateTargetRequest>,
) -> Result<Json<Target>, AppError> {
    if let Some(name) = &request.name {
        validate_length("name", name, 1, 200)?;
    }
    if let Some(base_url) = &request.base_url {
        validate_http_url("base_url", base_url)?;
    }
    let probe_interval = request
        .probe_interval
        .map(|secs| validate_range("probe_interval", secs, MIN_PROBE_INTERVAL_SECS, i64::MAX))
        .transpose()?
        .map(|secs| secs as u64);
    let expected_status = request
        .expected_status
        .map(|codes| validate_status_codes("expected_status", &codes))
        .transpose()?;

    let target = handlers
        .store
        .update_target(
            &api_id,
            TargetUpdate {
                name: request.name,
                base_url: request.base_url,
                probe_interval,
                expected_status,
            },
        )
        .await?;
    Ok(Json(target))
}

#[instrument(skip(handlers))]
pub async fn delete_target(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Path(api_id): Path<String>,
) -> Result<StatusCode, AppError> {
    // stop queued evaluations first so none recreate alerts after the cascade
    handlers.ingest.dispatcher().retire(&api_id);
    let summary = handlers.store.delete_target(&api_id).await?;

    info!(
        api_id = %api_id,
        rules_removed = summary.rules_removed,
        metrics_removed = summary.metrics_removed,
        alerts_removed = summary.alerts_removed,
        "Target deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

// =====================================================================================
// METRICS
// =====================================================================================

pub fn metric_from_request(request: IngestMetricRequest) -> Result<Metric, AppError> {
    let latency_ms = validate_range("latency_ms", request.latency_ms, 0, i64::MAX)? as u64;
    let status_code = validate_status_code("status_code", request.status_code)?;

    let mut tags = request.tags;
    if let Some(error_type) = request.error_type {
        tags.get_or_insert_with(Default::default)
            .insert("error_type".to_string(), Value::String(error_type));
    }

    Ok(Metric {
        api_id: request.api_id,
        timestamp: request.timestamp.unwrap_or_else(Utc::now),
        latency_ms,
        status_code,
        error: request.error,
        tags,
    })
}

pub async fn ingest_metric(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Json(request): Json<IngestMetricRequest>,
) -> Result<impl IntoResponse, AppError> {
    let metric = metric_from_request(request)?;
    handlers.ingest.ingest(metric).await?;
    Ok((StatusCode::ACCEPTED, Json(IngestAccepted::accepted())))
}

pub async fn list_metrics(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<Vec<Metric>>, AppError> {
    let api_id = query
        .api_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("api_id is required".to_string()))?;
    let limit = query
        .limit
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_METRICS_LIMIT)
        .min(MAX_METRICS_LIMIT);

    Ok(Json(handlers.store.recent_metrics(&api_id, limit).await?))
}

// =====================================================================================
// RULES
// =====================================================================================

/// Accepts the current wire names and the older aliases.
pub fn parse_rule_kind(kind: &str, threshold: &Value) -> Result<RuleKind, MonitoringError> {
    match kind {
        "latency_gt" | "latency_threshold" => threshold
            .as_u64()
            .map(RuleKind::LatencyGt)
            .ok_or_else(|| MonitoringError::InvalidRule("latency threshold must be an integer >= 0".to_string())),
        "status_not_in" | "status_not" | "status_allowlist" => {
            let values = threshold.as_array().ok_or_else(|| {
                MonitoringError::InvalidRule("status threshold must be an array of status codes".to_string())
            })?;
            let codes: Vec<i64> = values
                .iter()
                .map(|v| {
                    v.as_i64().ok_or_else(|| {
                        MonitoringError::InvalidRule(format!("invalid status code: {}", v))
                    })
                })
                .collect::<Result<_, _>>()?;
            let allowed = validate_status_codes("threshold", &codes)
                .map_err(|e| MonitoringError::InvalidRule(e.to_string()))?;
            Ok(RuleKind::StatusNotIn(allowed.into_iter().collect::<BTreeSet<u16>>()))
        }
        other => Err(MonitoringError::InvalidRule(format!("unknown rule type: {}", other))),
    }
}

#[instrument(skip(handlers, request), fields(rule_id = %request.rule_id))]
pub async fn create_rule(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Json(request): Json<CreateRuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_identifier("rule_id", &request.rule_id, 3, 64)?;
    validate_length("name", &request.name, 1, 200)?;
    let kind = parse_rule_kind(&request.kind, &request.threshold)?;
    let api_id = request.api_id.filter(|id| !id.is_empty());

    let rule = handlers
        .store
        .insert_rule(Rule {
            rule_id: request.rule_id,
            name: request.name,
            api_id,
            kind,
            active: request.active.unwrap_or(true),
            created_at: Utc::now(),
        })
        .await?;

    info!(
        rule_id = %rule.rule_id,
        api_id = rule.api_id.as_deref().unwrap_or("*"),
        kind = rule.kind.type_name(),
        "Rule created"
    );
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn list_rules(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<RuleQuery>,
) -> Result<Json<Vec<Rule>>, AppError> {
    let api_id = query.api_id.filter(|id| !id.is_empty());
    Ok(Json(handlers.store.list_rules(api_id.as_deref()).await?))
}

#[instrument(skip(handlers, request))]
pub async fn toggle_rule(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Path(rule_id): Path<String>,
    Json(request): Json<ToggleRuleRequest>,
) -> Result<Json<Rule>, AppError> {
    let rule = handlers.store.set_rule_active(&rule_id, request.active).await?;
    info!(rule_id = %rule.rule_id, active = rule.active, "Rule toggled");
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Path(rule_id): Path<String>,
) -> Result<StatusCode, AppError> {
    handlers.store.delete_rule(&rule_id).await?;
    info!(rule_id = %rule_id, "Rule deleted");
    Ok(StatusCode::NO_CONTENT)
}

// =====================================================================================
// ALERTS
// =====================================================================================

pub async fn list_alerts(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<Vec<Alert>>, AppError> {
    let state = query
        .state
        .filter(|state| !state.is_empty())
        .map(|state| state.parse::<AlertState>())
        .transpose()
        .map_err(AppError::ValidationError)?;

    let filter = AlertFilter {
        api_id: query.api_id.filter(|id| !id.is_empty()),
        state,
        limit: query.limit,
    };
    Ok(Json(handlers.store.list_alerts(filter).await?))
}
