//! End-to-end REST surface tests covering the full Hive→Colony→Run→Task
//! lifecycle and emergency stop, driven entirely through HTTP requests
//! against an in-memory router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hf_akashic::Akashic;
use hf_config::HiveForgeConfig;
use hf_daemon::{build_app, AppState};
use hf_scheduler::Scheduler;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_state(vault: &std::path::Path) -> Arc<AppState> {
    let akashic = Arc::new(Akashic::new(vault));
    Arc::new(AppState { scheduler: Arc::new(Scheduler::new(akashic)), config: HiveForgeConfig::default() })
}

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let resp = app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_returns_ok() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    let (status, json) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn hive_colony_run_task_close() {
    let tmp = tempfile::tempdir().unwrap();
    let state = test_state(tmp.path());

    let (status, hive) = post_json(build_app(state.clone()), "/hives", json!({"name": "e2e hive"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let hive_id = hive["hive_id"].as_str().unwrap().to_string();

    let (status, colony) = post_json(
        build_app(state.clone()),
        &format!("/hives/{hive_id}/colonies"),
        json!({"name": "feature colony", "goal": "ship it"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(colony["template"], "balanced");
    let colony_id = colony["colony_id"].as_str().unwrap().to_string();

    let (status, _) = post_json(build_app(state.clone()), &format!("/colonies/{colony_id}/start"), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, run) =
        post_json(build_app(state.clone()), "/runs", json!({"goal": "do the work", "colony_id": colony_id})).await;
    assert_eq!(status, StatusCode::CREATED);
    let run_id = run["run_id"].as_str().unwrap().to_string();

    let (status, run_state) = get_json(build_app(state.clone()), &format!("/runs/{run_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run_state["status"], "running");
    assert_eq!(run_state["goal"], "do the work");

    let (status, task) =
        post_json(build_app(state.clone()), &format!("/runs/{run_id}/tasks"), json!({"title": "step one"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let task_id = task["task_id"].as_str().unwrap().to_string();

    let (status, _) = post_json(
        build_app(state.clone()),
        &format!("/runs/{run_id}/tasks/{task_id}/complete"),
        json!({"result": {"message": "done"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        post_json(build_app(state.clone()), &format!("/runs/{run_id}/complete"), json!({"summary": "all done"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, run_state) = get_json(build_app(state.clone()), &format!("/runs/{run_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run_state["status"], "completed");

    let (status, events) = get_json(build_app(state.clone()), &format!("/runs/{run_id}/events")).await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<_> = events.as_array().unwrap().iter().map(|e| e["type"].as_str().unwrap().to_string()).collect();
    assert_eq!(types, vec!["run.started", "task.created", "task.completed", "run.completed"]);

    let event_id = events[0]["id"].as_str().unwrap();
    let (status, lineage) =
        get_json(build_app(state.clone()), &format!("/runs/{run_id}/events/{event_id}/lineage")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lineage["root"], event_id);

    let (status, _) = post_json(build_app(state.clone()), &format!("/colonies/{colony_id}/complete"), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post_json(build_app(state.clone()), &format!("/hives/{hive_id}/close"), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, hive) = get_json(build_app(state), &format!("/hives/{hive_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hive["status"], "closed");
}

#[tokio::test]
async fn emergency_stop_aborts_run() {
    let tmp = tempfile::tempdir().unwrap();
    let state = test_state(tmp.path());

    let (_, hive) = post_json(build_app(state.clone()), "/hives", json!({"name": "hive"})).await;
    let hive_id = hive["hive_id"].as_str().unwrap().to_string();
    let (_, colony) = post_json(build_app(state.clone()), &format!("/hives/{hive_id}/colonies"), json!({"name": "colony"})).await;
    let colony_id = colony["colony_id"].as_str().unwrap().to_string();
    let (_, run) = post_json(build_app(state.clone()), "/runs", json!({"goal": "goal", "colony_id": colony_id})).await;
    let run_id = run["run_id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        build_app(state.clone()),
        &format!("/runs/{run_id}/emergency-stop"),
        json!({"reason": "operator request"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "aborted");
    assert_eq!(body["stopped"], true);

    let (status, run) = get_json(build_app(state), &format!("/runs/{run_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "aborted");
}

#[tokio::test]
async fn colony_creation_selects_quality_template_for_high_risk_work() {
    let tmp = tempfile::tempdir().unwrap();
    let state = test_state(tmp.path());

    let (_, hive) = post_json(build_app(state.clone()), "/hives", json!({"name": "hive"})).await;
    let hive_id = hive["hive_id"].as_str().unwrap().to_string();

    let (status, colony) = post_json(
        build_app(state.clone()),
        &format!("/hives/{hive_id}/colonies"),
        json!({"name": "risky migration", "risk": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(colony["template"], "quality");

    let (status, hive) = get_json(build_app(state), &format!("/hives/{hive_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hive["colonies"][0]["template"], "quality");
}

#[tokio::test]
async fn missing_hive_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    let (status, _) = get_json(app, "/hives/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_key_auth_gates_protected_routes() {
    let tmp = tempfile::tempdir().unwrap();
    let akashic = Arc::new(Akashic::new(tmp.path()));
    let state = Arc::new(AppState {
        scheduler: Arc::new(Scheduler::new(akashic)),
        config: HiveForgeConfig { api_key: Some("secret".to_string()), ..HiveForgeConfig::default() },
    });

    let (status, _) = get_json(build_app(state.clone()), "/hives").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_json(build_app(state.clone()), "/health").await;
    assert_eq!(status, StatusCode::OK);

    let resp = build_app(state)
        .oneshot(Request::builder().uri("/hives").header("x-api-key", "secret").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
