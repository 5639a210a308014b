//! Modelos de dominio (filas crudas de `appeals`, apelaciones canónicas y
//! entradas/salidas de la API de predicción).

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Representa una fila de la tabla `appeals` tal y como la devuelve el almacén.
/// Todos los campos pueden venir nulos y las fechas llegan como texto, sin
/// interpretar.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct RawAppeal {
    pub created_at: Option<String>,
    pub registration_date: Option<String>,
    pub completion_date: Option<String>,
    pub district: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub content: Option<String>,
}

/// Apelación validada, lista para el codificador de características.
/// `days_to_resolve` siempre es finito y no negativo.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalAppeal {
    pub district: String,
    pub category: String,
    pub day_of_week: u8,
    pub month: u8,
    pub days_to_resolve: f32,
}

/// Día de la semana (0 = lunes) y mes (1..=12) de una marca temporal.
pub fn calendar_codes(ts: &DateTime<Utc>) -> (u8, u8) {
    (ts.weekday().num_days_from_monday() as u8, ts.month() as u8)
}

/// Entrada de los endpoints `/predict` y `/actual`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppealInput {
    pub district: String,
    pub category: String,
    /// Fecha de registro de la apelación. Si no llega, `/predict` toma el
    /// instante de la petición: el día de la semana y el mes salen del reloj
    /// del servidor y la misma petición puede predecir otra cosa otro día.
    /// `/actual` no la usa.
    #[serde(default)]
    pub registration_date: Option<DateTime<Utc>>,
}

impl AppealInput {
    pub fn new(district: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            district: district.into(),
            category: category.into(),
            registration_date: None,
        }
    }
}

/// Familias de regresores que entrena cada ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelKind {
    Linear,
    RandomForest,
    GradientBoosted,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::Linear,
        ModelKind::RandomForest,
        ModelKind::GradientBoosted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::RandomForest => "randomForest",
            ModelKind::GradientBoosted => "gradientBoosted",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Un valor por familia de modelo. Sirve para modelos, métricas y
/// predicciones, de modo que nunca exista un conjunto parcial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerModel<T> {
    pub linear: T,
    pub random_forest: T,
    pub gradient_boosted: T,
}

impl<T> PerModel<T> {
    /// Construye los tres valores en orden; el primer error corta el resto.
    pub fn try_from_fn<E>(mut f: impl FnMut(ModelKind) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            linear: f(ModelKind::Linear)?,
            random_forest: f(ModelKind::RandomForest)?,
            gradient_boosted: f(ModelKind::GradientBoosted)?,
        })
    }

    pub fn get(&self, kind: ModelKind) -> &T {
        match kind {
            ModelKind::Linear => &self.linear,
            ModelKind::RandomForest => &self.random_forest,
            ModelKind::GradientBoosted => &self.gradient_boosted,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(ModelKind, &T) -> U) -> PerModel<U> {
        PerModel {
            linear: f(ModelKind::Linear, &self.linear),
            random_forest: f(ModelKind::RandomForest, &self.random_forest),
            gradient_boosted: f(ModelKind::GradientBoosted, &self.gradient_boosted),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelKind, &T)> {
        ModelKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}
