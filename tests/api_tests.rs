//! Pruebas de integración de la API HTTP: entrenamiento en segundo plano,
//! predicción, métricas y persistencia del snapshot.

mod common;

use std::sync::Arc;
use std::time::Duration;

use appeal_forecast::registry::{load_snapshot, ModelRegistry};
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{
    corpus, in_memory, reversed_corpus, server, state_with, wait_for_job, ScriptedSource,
};

fn assert_error_code(body: &Value, code: &str) {
    assert_eq!(body["code"], code, "cuerpo inesperado: {body}");
    assert!(body["error"].is_string());
}

// ============ Arranque en frío ============

#[tokio::test]
async fn test_health_on_cold_start() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(state_with(None, &dir.path().join("models.json")));

    let response = server.get("/").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["modelLoaded"], false);
    assert!(body["snapshotId"].is_null());
}

#[tokio::test]
async fn test_predict_before_training_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(state_with(in_memory(corpus(50, 1)), &dir.path().join("m.json")));

    let response = server
        .post("/predict")
        .json(&json!({ "district": "A", "category": "X" }))
        .await;
    response.assert_status_not_found();
    assert_error_code(&response.json(), "NO_TRAINED_MODEL");

    let response = server.get("/metrics").await;
    response.assert_status_not_found();
    assert_error_code(&response.json(), "NO_TRAINED_MODEL");

    server.get("/performance").await.assert_status_not_found();
}

#[tokio::test]
async fn test_train_without_database_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(state_with(None, &dir.path().join("m.json")));

    let response = server.post("/train").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_error_code(&response.json(), "NO_DATA_SOURCE");
}

#[tokio::test]
async fn test_blank_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(state_with(in_memory(corpus(50, 1)), &dir.path().join("m.json")));

    let response = server
        .post("/predict")
        .json(&json!({ "district": "  ", "category": "X" }))
        .await;
    response.assert_status_bad_request();
    assert_error_code(&response.json(), "BAD_REQUEST");
}

// ============ Entrenamiento ============

#[tokio::test]
async fn test_train_then_predict_five_hundred_records() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = dir.path().join("models.json");
    let server = server(state_with(in_memory(corpus(500, 1)), &artifacts));

    let response = server.post("/train").await;
    response.assert_status(StatusCode::ACCEPTED);
    let accepted: Value = response.json();
    assert_eq!(accepted["status"], "running");

    let status = wait_for_job(&server).await;
    assert_eq!(status["state"], "succeeded", "{status}");
    assert_eq!(status["jobId"], accepted["jobId"]);

    let metrics: Value = server.get("/metrics").await.json();
    for kind in ["linear", "randomForest", "gradientBoosted"] {
        let mae = metrics["mae"][kind].as_f64().unwrap();
        let rmse = metrics["rmse"][kind].as_f64().unwrap();
        assert!(mae.is_finite() && rmse.is_finite(), "{kind}");
        assert!(rmse >= mae && mae >= 0.0, "{kind}");
    }
    assert_eq!(metrics["snapshotId"], status["snapshotId"]);

    let response = server
        .post("/predict")
        .json(&json!({
            "district": "A",
            "category": "X",
            "registrationDate": "2024-06-03T10:00:00Z"
        }))
        .await;
    response.assert_status_ok();
    let prediction: Value = response.json();
    for kind in ["linear", "randomForest", "gradientBoosted"] {
        let days = prediction[kind].as_f64().unwrap();
        assert!(days.is_finite() && days >= 0.0, "{kind}: {days}");
    }
    assert_eq!(prediction["snapshotId"], status["snapshotId"]);
    assert_eq!(prediction["unseenDistrict"], false);

    let performance: Vec<Value> = server.get("/performance").await.json();
    assert_eq!(performance.len(), 100);
    assert!(performance[0]["predicted"]["randomForest"].is_number());

    let health: Value = server.get("/").await.json();
    assert_eq!(health["modelLoaded"], true);
    assert!(artifacts.exists());
}

#[tokio::test]
async fn test_reversed_durations_fail_with_insufficient_data() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(state_with(in_memory(reversed_corpus(200)), &dir.path().join("m.json")));

    server.post("/train").await.assert_status(StatusCode::ACCEPTED);
    let status = wait_for_job(&server).await;

    assert_eq!(status["state"], "failed");
    let message = status["message"].as_str().unwrap();
    assert!(message.contains("datos insuficientes"), "{message}");
    assert!(message.contains("0 apelaciones válidas"), "{message}");
    server
        .post("/predict")
        .json(&json!({ "district": "A", "category": "X" }))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_back_to_back_triggers_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![Ok(corpus(300, 1))]).with_delay(Duration::from_millis(300));
    let server = server(state_with(Some(Arc::new(source)), &dir.path().join("m.json")));

    let first = server.post("/train").await;
    first.assert_status(StatusCode::ACCEPTED);
    let first: Value = first.json();

    let second = server.post("/train").await;
    second.assert_status(StatusCode::CONFLICT);
    assert_error_code(&second.json(), "TRAINING_IN_PROGRESS");

    let status = wait_for_job(&server).await;
    assert_eq!(status["state"], "succeeded");
    assert_eq!(status["jobId"], first["jobId"]);
    server
        .post("/predict")
        .json(&json!({ "district": "B", "category": "Y" }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_failed_run_keeps_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![
        Ok(corpus(200, 1)),
        Err("conexión rechazada".to_string()),
    ]);
    let server = server(state_with(Some(Arc::new(source)), &dir.path().join("m.json")));

    server.post("/train").await.assert_status(StatusCode::ACCEPTED);
    let first = wait_for_job(&server).await;
    assert_eq!(first["state"], "succeeded");

    server.post("/train").await.assert_status(StatusCode::ACCEPTED);
    let second = wait_for_job(&server).await;
    assert_eq!(second["state"], "failed");
    assert!(second["message"].as_str().unwrap().contains("conexión rechazada"));

    let metrics: Value = server.get("/metrics").await.json();
    assert_eq!(metrics["snapshotId"], first["snapshotId"]);
}

#[tokio::test]
async fn test_cancel_keeps_cold_registry() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![Ok(corpus(200, 1))]).with_delay(Duration::from_millis(300));
    let server = server(state_with(Some(Arc::new(source)), &dir.path().join("m.json")));

    let response = server.post("/train/cancel").await;
    response.assert_status(StatusCode::CONFLICT);
    assert_error_code(&response.json(), "NO_TRAINING_RUNNING");

    let accepted: Value = server.post("/train").await.json();
    let response = server.post("/train/cancel").await;
    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(response.json::<Value>()["jobId"], accepted["jobId"]);

    let status = wait_for_job(&server).await;
    assert_eq!(status["state"], "cancelled");
    server.get("/metrics").await.assert_status_not_found();
}

// ============ Persistencia ============

#[tokio::test]
async fn test_artifact_reload_serves_identical_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = dir.path().join("models.json");
    let first = server(state_with(in_memory(corpus(300, 1)), &artifacts));

    first.post("/train").await.assert_status(StatusCode::ACCEPTED);
    assert_eq!(wait_for_job(&first).await["state"], "succeeded");

    let input = json!({
        "district": "C",
        "category": "Y",
        "registrationDate": "2024-02-14T08:00:00Z"
    });
    let before: Value = first.post("/predict").json(&input).await.json();

    // Un proceso nuevo arranca con el artefacto guardado y sin base de datos.
    let snapshot = load_snapshot(&artifacts).unwrap().unwrap();
    let state = state_with(None, &artifacts).with_registry(Arc::new(ModelRegistry::with_snapshot(snapshot)));
    let second = server(state);

    let after: Value = second.post("/predict").json(&input).await.json();
    assert_eq!(after["snapshotId"], before["snapshotId"]);
    for kind in ["linear", "randomForest", "gradientBoosted"] {
        let a = before[kind].as_f64().unwrap();
        let b = after[kind].as_f64().unwrap();
        assert!((a - b).abs() < 1e-9, "{kind}: {a} != {b}");
    }
}

// ============ Caso histórico ============

#[tokio::test]
async fn test_actual_returns_a_historical_case() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(state_with(in_memory(corpus(60, 1)), &dir.path().join("m.json")));

    let found: Value = server
        .post("/actual")
        .json(&json!({ "district": "A", "category": "x" }))
        .await
        .json();
    assert!(found["actualDays"].as_f64().unwrap() >= 1.0);

    let missing: Value = server
        .post("/actual")
        .json(&json!({ "district": "Q", "category": "X" }))
        .await
        .json();
    assert!(missing["actualDays"].is_null());
}
