use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::{ApiError, ApiResult, TriggerError},
    evaluation::PerformancePoint,
    jobs::{JobState, TrainingStatus},
    models::AppealInput,
    predictor::{self, MetricsReport, Prediction},
};

// --- Respuestas de la API ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    snapshot_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainAccepted {
    job_id: Uuid,
    status: JobState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAccepted {
    job_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualResponse {
    actual_days: Option<f64>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/train", post(train_handler))
        .route("/train/status", get(train_status_handler))
        .route("/train/cancel", post(train_cancel_handler))
        .route("/predict", post(predict_handler))
        .route("/actual", post(actual_handler))
        .route("/metrics", get(metrics_handler))
        .route("/performance", get(performance_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.registry.current();
    Json(HealthResponse {
        status: "ok",
        model_loaded: snapshot.is_some(),
        snapshot_id: snapshot.map(|s| s.id),
    })
}

#[axum::debug_handler]
async fn train_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let source = state.source.clone().ok_or(TriggerError::NoDataSource)?;
    let job_id = state.jobs.trigger(
        source,
        state.registry.clone(),
        Some(state.config.artifacts_path.clone()),
    )?;
    Ok((
        StatusCode::ACCEPTED,
        Json(TrainAccepted {
            job_id,
            status: JobState::Running,
        }),
    ))
}

#[axum::debug_handler]
async fn train_status_handler(State(state): State<AppState>) -> Json<TrainingStatus> {
    Json(state.jobs.status())
}

#[axum::debug_handler]
async fn train_cancel_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let job_id = state.jobs.cancel()?;
    Ok((StatusCode::ACCEPTED, Json(CancelAccepted { job_id })))
}

#[axum::debug_handler]
async fn predict_handler(
    State(state): State<AppState>,
    Json(payload): Json<AppealInput>,
) -> ApiResult<Json<Prediction>> {
    validate(&payload)?;
    let prediction = predictor::predict(&state.registry, &payload)?;
    Ok(Json(prediction))
}

#[axum::debug_handler]
async fn actual_handler(
    State(state): State<AppState>,
    Json(payload): Json<AppealInput>,
) -> ApiResult<Json<ActualResponse>> {
    validate(&payload)?;
    let Some(source) = state.source.clone() else {
        return Err(TriggerError::NoDataSource.into());
    };

    // Un fallo del almacén se registra y se responde como "sin caso".
    let actual_days = match source.sample_case(&payload.district, &payload.category).await {
        Ok(days) => days,
        Err(err) => {
            error!("Error buscando un caso histórico: {err:#}");
            None
        }
    };
    info!(
        district = %payload.district,
        category = %payload.category,
        found = actual_days.is_some(),
        "Consulta de caso histórico"
    );
    Ok(Json(ActualResponse { actual_days }))
}

#[axum::debug_handler]
async fn metrics_handler(State(state): State<AppState>) -> ApiResult<Json<MetricsReport>> {
    Ok(Json(predictor::metrics(&state.registry)?))
}

#[axum::debug_handler]
async fn performance_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PerformancePoint>>> {
    Ok(Json(predictor::performance(&state.registry)?))
}

fn validate(payload: &AppealInput) -> Result<(), ApiError> {
    if payload.district.trim().is_empty() {
        return Err(ApiError::BadRequest("'district' no puede estar vacío".to_string()));
    }
    if payload.category.trim().is_empty() {
        return Err(ApiError::BadRequest("'category' no puede estar vacío".to_string()));
    }
    Ok(())
}
