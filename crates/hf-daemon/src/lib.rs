//! REST surface over the Scheduler (spec.md §6): axum app, middleware,
//! handlers. Single-host, localhost-bound by default.

pub mod middleware;

use axum::extract::{Path as AxPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hf_config::HiveForgeConfig;
use hf_core::SealedEvent;
use hf_error::HiveForgeError;
use hf_scheduler::{Scheduler, Scope};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub config: HiveForgeConfig,
}

/// Builds the router with middleware applied in the teacher's layering
/// order: CORS and rate limiting wrap the whole stack (Tower layers run
/// outside-in), request id and logging run per-request via
/// `axum::middleware::from_fn`, and API key auth runs last so it sees the
/// already-tagged, already-logged request.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = middleware::CorsConfig::default().to_cors_layer();
    let rate_limiter = middleware::RateLimiter::new(600, Duration::from_secs(60)).into_layer();

    Router::new()
        .route("/health", get(cmd_health))
        .route("/hives", post(cmd_create_hive).get(cmd_list_hives))
        .route("/hives/{id}", get(cmd_get_hive))
        .route("/hives/{id}/close", post(cmd_close_hive))
        .route("/hives/{id}/colonies", post(cmd_create_colony))
        .route("/colonies/{id}/start", post(cmd_start_colony))
        .route("/colonies/{id}/complete", post(cmd_complete_colony))
        .route("/runs", post(cmd_start_run))
        .route("/runs/{id}", get(cmd_get_run))
        .route("/runs/{id}/tasks", post(cmd_add_task))
        .route("/runs/{id}/tasks/{tid}/complete", post(cmd_complete_task))
        .route("/runs/{id}/complete", post(cmd_complete_run))
        .route("/runs/{id}/emergency-stop", post(cmd_emergency_stop))
        .route("/runs/{id}/events", get(cmd_run_events))
        .route("/runs/{id}/events/{eid}/lineage", get(cmd_event_lineage))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::api_key_auth))
        .layer(axum::middleware::from_fn(middleware::RequestLogger::layer))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(rate_limiter)
        .layer(cors)
        .with_state(state)
}

async fn cmd_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active_runs = state.scheduler.hives.list_hives().await.len();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_runs": active_runs,
    }))
}

#[derive(Debug, Deserialize)]
struct CreateHiveRequest {
    name: String,
    #[allow(dead_code)]
    description: Option<String>,
}

async fn cmd_create_hive(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateHiveRequest>,
) -> Result<(StatusCode, Json<Value>), HiveForgeError> {
    let id = hf_core::EventId::new().to_string();
    let record = state.scheduler.create_hive(&id, &req.name).await?;
    Ok((StatusCode::CREATED, Json(json!({"hive_id": record.id, "name": record.name, "status": "active"}))))
}

async fn cmd_list_hives(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let hives = state.scheduler.hives.list_hives().await;
    Json(
        hives
            .into_iter()
            .map(|h| json!({"hive_id": h.id, "name": h.name, "status": hive_status(h.state)}))
            .collect::<Vec<_>>(),
    )
}

async fn cmd_get_hive(State(state): State<Arc<AppState>>, AxPath(id): AxPath<String>) -> Result<Json<Value>, HiveForgeError> {
    let hive = state.scheduler.hives.get_hive(&id).await.ok_or_else(|| HiveForgeError::not_found("hive", id.clone()))?;
    let mut colonies = Vec::new();
    for colony_id in &hive.colonies {
        if let Some(c) = state.scheduler.hives.get_colony(colony_id).await {
            colonies.push(json!({
                "colony_id": c.id,
                "name": c.name,
                "status": colony_status(c.state),
                "template": c.template.name.as_str(),
            }));
        }
    }
    Ok(Json(json!({"hive_id": hive.id, "name": hive.name, "status": hive_status(hive.state), "colonies": colonies})))
}

async fn cmd_close_hive(State(state): State<Arc<AppState>>, AxPath(id): AxPath<String>) -> Result<Json<Value>, HiveForgeError> {
    state.scheduler.close_hive(&id).await?;
    Ok(Json(json!({"hive_id": id, "status": "closed"})))
}

#[derive(Debug, Deserialize)]
struct CreateColonyRequest {
    name: String,
    goal: Option<String>,
    /// Task complexity/risk/urgency (1-5 each), fed to the Swarming
    /// Protocol's template auto-selection. Omitted fields default to 3.
    complexity: Option<u8>,
    risk: Option<u8>,
    urgency: Option<u8>,
}

async fn cmd_create_colony(
    State(state): State<Arc<AppState>>,
    AxPath(hive_id): AxPath<String>,
    Json(req): Json<CreateColonyRequest>,
) -> Result<(StatusCode, Json<Value>), HiveForgeError> {
    let id = hf_core::EventId::new().to_string();
    let defaults = hf_scheduler::SwarmingFeatures::default();
    let features = hf_scheduler::SwarmingFeatures {
        complexity: req.complexity.unwrap_or(defaults.complexity),
        risk: req.risk.unwrap_or(defaults.risk),
        urgency: req.urgency.unwrap_or(defaults.urgency),
    };
    let record = state.scheduler.create_colony(&hive_id, &id, &req.name, req.goal.as_deref(), Some(features)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "colony_id": record.id,
            "name": record.name,
            "status": "created",
            "template": record.template.name.as_str(),
        })),
    ))
}

async fn cmd_start_colony(State(state): State<Arc<AppState>>, AxPath(id): AxPath<String>) -> Result<Json<Value>, HiveForgeError> {
    state.scheduler.start_colony(&id).await?;
    Ok(Json(json!({"colony_id": id, "status": "running"})))
}

async fn cmd_complete_colony(State(state): State<Arc<AppState>>, AxPath(id): AxPath<String>) -> Result<Json<Value>, HiveForgeError> {
    state.scheduler.complete_colony(&id).await?;
    Ok(Json(json!({"colony_id": id, "status": "completed"})))
}

#[derive(Debug, Deserialize)]
struct StartRunRequest {
    goal: String,
    colony_id: String,
    hive_id: Option<String>,
}

async fn cmd_start_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<Value>), HiveForgeError> {
    let id = hf_core::EventId::new().to_string();
    state.scheduler.start_run(&id, &req.colony_id, req.hive_id.as_deref(), &req.goal, Vec::new()).await?;
    Ok((StatusCode::CREATED, Json(json!({"run_id": id, "goal": req.goal, "status": "running"}))))
}

async fn cmd_get_run(State(state): State<Arc<AppState>>, AxPath(run_id): AxPath<String>) -> Result<Json<Value>, HiveForgeError> {
    let run = state.scheduler.run_snapshot(&run_id).await?.ok_or_else(|| HiveForgeError::not_found("run", run_id.clone()))?;
    Ok(Json(json!({
        "run_id": run.run_id,
        "colony_id": run.colony_id,
        "goal": run.goal,
        "status": run.status.as_str(),
    })))
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    title: String,
    #[allow(dead_code)]
    description: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
}

async fn cmd_add_task(
    State(state): State<Arc<AppState>>,
    AxPath(run_id): AxPath<String>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Value>), HiveForgeError> {
    let task_id = hf_core::EventId::new().to_string();
    state.scheduler.add_task(&run_id, &task_id, &req.title, req.depends_on).await?;
    Ok((StatusCode::CREATED, Json(json!({"task_id": task_id, "title": req.title, "status": "created"}))))
}

#[derive(Debug, Deserialize)]
struct CompleteTaskRequest {
    result: Value,
}

async fn cmd_complete_task(
    State(state): State<Arc<AppState>>,
    AxPath((run_id, task_id)): AxPath<(String, String)>,
    Json(req): Json<CompleteTaskRequest>,
) -> Result<Json<Value>, HiveForgeError> {
    state.scheduler.complete_task(&run_id, &task_id, req.result.to_string(), Vec::new()).await?;
    Ok(Json(json!({"task_id": task_id, "status": "completed"})))
}

#[derive(Debug, Deserialize)]
struct CompleteRunRequest {
    #[allow(dead_code)]
    summary: Option<String>,
}

async fn cmd_complete_run(
    State(state): State<Arc<AppState>>,
    AxPath(run_id): AxPath<String>,
    Json(_req): Json<CompleteRunRequest>,
) -> Result<Json<Value>, HiveForgeError> {
    state.scheduler.complete_run(&run_id).await?;
    Ok(Json(json!({"run_id": run_id, "status": "completed"})))
}

#[derive(Debug, Deserialize)]
struct EmergencyStopRequest {
    reason: String,
}

async fn cmd_emergency_stop(
    State(state): State<Arc<AppState>>,
    AxPath(run_id): AxPath<String>,
    Json(req): Json<EmergencyStopRequest>,
) -> Result<Json<Value>, HiveForgeError> {
    let hit = state.scheduler.emergency_stop(Scope::Run(run_id.clone()), &req.reason).await?;
    Ok(Json(json!({"run_id": run_id, "status": "aborted", "stopped": !hit.is_empty()})))
}

async fn cmd_run_events(
    State(state): State<Arc<AppState>>,
    AxPath(run_id): AxPath<String>,
) -> Result<Json<Vec<SealedEvent>>, HiveForgeError> {
    Ok(Json(state.scheduler.events(&run_id).await?))
}

#[derive(Debug, Serialize)]
struct LineageResponse {
    root: String,
    nodes: Vec<(String, Vec<String>)>,
    truncated: bool,
}

async fn cmd_event_lineage(
    State(state): State<Arc<AppState>>,
    AxPath((run_id, event_id)): AxPath<(String, String)>,
) -> Result<Json<LineageResponse>, HiveForgeError> {
    let graph = state.scheduler.lineage(&run_id, &event_id, 64).await?;
    Ok(Json(LineageResponse {
        root: graph.root.to_string(),
        nodes: graph.nodes.into_iter().map(|(id, parents)| (id.to_string(), parents.iter().map(|p| p.to_string()).collect())).collect(),
        truncated: graph.truncated,
    }))
}

fn hive_status(state: hf_scheduler::HiveState) -> &'static str {
    match state {
        hf_scheduler::HiveState::Active => "active",
        hf_scheduler::HiveState::Closed => "closed",
    }
}

fn colony_status(state: hf_scheduler::ColonyState) -> &'static str {
    match state {
        hf_scheduler::ColonyState::Pending => "created",
        hf_scheduler::ColonyState::Running => "running",
        hf_scheduler::ColonyState::Completed => "completed",
        hf_scheduler::ColonyState::Failed => "failed",
    }
}
