//! Taxonomía de errores del servicio y su traducción a respuestas HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::encoding::EncodingError;
use crate::evaluation::EvaluationError;
use crate::models::ModelKind;
use crate::regression::FitError;

/// Fallo de una ejecución de entrenamiento. Nunca toca el snapshot publicado.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("datos insuficientes: {available} apelaciones válidas, se necesitan al menos {required}")]
    InsufficientData { available: usize, required: usize },
    #[error("no se pudo ajustar el modelo {kind}: {source}")]
    ModelFit {
        kind: ModelKind,
        #[source]
        source: FitError,
    },
    #[error("no se pudo evaluar el modelo {kind}: {source}")]
    Evaluation {
        kind: ModelKind,
        #[source]
        source: EvaluationError,
    },
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("no se pudieron leer las apelaciones: {0}")]
    Source(String),
    #[error("entrenamiento cancelado")]
    Cancelled,
    #[error("la tarea de entrenamiento terminó de forma anómala: {0}")]
    Aborted(String),
}

/// Rechazo de una orden sobre el trabajo de entrenamiento.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("ya hay un entrenamiento en curso ({0})")]
    TrainingInProgress(Uuid),
    #[error("no hay ningún entrenamiento en curso")]
    NothingRunning,
    #[error("DATABASE_URL no está configurada; no se puede entrenar")]
    NoDataSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictError {
    #[error("no hay modelos entrenados; lanza primero un entrenamiento con /train")]
    NoTrainedModel,
}

/// Errores de la API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Predict(#[from] PredictError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error("Petición inválida: {0}")]
    BadRequest(String),

    #[error("Error interno: {0}")]
    Internal(String),
}

/// Cuerpo JSON de una respuesta de error
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Predict(PredictError::NoTrainedModel) => {
                (StatusCode::NOT_FOUND, "NO_TRAINED_MODEL")
            }
            ApiError::Trigger(TriggerError::TrainingInProgress(_)) => {
                (StatusCode::CONFLICT, "TRAINING_IN_PROGRESS")
            }
            ApiError::Trigger(TriggerError::NothingRunning) => {
                (StatusCode::CONFLICT, "NO_TRAINING_RUNNING")
            }
            ApiError::Trigger(TriggerError::NoDataSource) => {
                (StatusCode::SERVICE_UNAVAILABLE, "NO_DATA_SOURCE")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
