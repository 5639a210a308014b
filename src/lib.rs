//! Servicio de predicción del tiempo de resolución de apelaciones ciudadanas.

// Módulos de la aplicación
pub mod api;
pub mod app_state;
pub mod config;
pub mod encoding;
pub mod error;
pub mod evaluation;
pub mod jobs;
pub mod models;
pub mod normalize;
pub mod predictor;
pub mod registry;
pub mod regression;
pub mod source;
pub mod trainer;

pub use api::create_router;
pub use app_state::AppState;
