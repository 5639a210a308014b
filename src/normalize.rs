//! Normalización de las filas crudas de `appeals` en apelaciones canónicas.
//!
//! Es una transformación pura: cada fila inválida se descarta (y se cuenta),
//! nunca se aborta el lote completo.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{calendar_codes, CanonicalAppeal, RawAppeal};

const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y"];

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Motivo por el que una fila cruda no llega a ser una apelación canónica.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    #[error("falta la fecha de creación")]
    MissingCreation,
    #[error("la apelación no tiene fecha de resolución")]
    MissingCompletion,
    #[error("fecha ilegible en '{field}': {value}")]
    UnparseableTimestamp { field: &'static str, value: String },
    #[error("falta el campo '{0}'")]
    MissingField(&'static str),
    #[error("duración negativa o inválida: {0} días")]
    InvalidDuration(f64),
}

/// Contador de filas descartadas por motivo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropCounts {
    pub missing_timestamp: usize,
    pub missing_completion: usize,
    pub unparseable_timestamp: usize,
    pub missing_field: usize,
    pub invalid_duration: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.missing_timestamp
            + self.missing_completion
            + self.unparseable_timestamp
            + self.missing_field
            + self.invalid_duration
    }

    fn record(&mut self, err: &DataIntegrityError) {
        match err {
            DataIntegrityError::MissingCreation => self.missing_timestamp += 1,
            DataIntegrityError::MissingCompletion => self.missing_completion += 1,
            DataIntegrityError::UnparseableTimestamp { .. } => self.unparseable_timestamp += 1,
            DataIntegrityError::MissingField(_) => self.missing_field += 1,
            DataIntegrityError::InvalidDuration(_) => self.invalid_duration += 1,
        }
    }
}

/// Resumen de una normalización, sólo para observabilidad.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped: DropCounts,
}

impl fmt::Display for NormalizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} filas leídas, {} válidas, {} descartadas (sin fecha: {}, sin resolución: {}, fecha ilegible: {}, sin distrito/categoría: {}, duración inválida: {})",
            self.rows_read,
            self.rows_kept,
            self.dropped.total(),
            self.dropped.missing_timestamp,
            self.dropped.missing_completion,
            self.dropped.unparseable_timestamp,
            self.dropped.missing_field,
            self.dropped.invalid_duration,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub appeals: Vec<CanonicalAppeal>,
    pub report: NormalizationReport,
}

/// Normaliza un lote completo. Mismo lote, mismo resultado.
pub fn normalize(raw: &[RawAppeal]) -> Normalized {
    let mut appeals = Vec::with_capacity(raw.len());
    let mut dropped = DropCounts::default();

    for (row, record) in raw.iter().enumerate() {
        match normalize_one(record) {
            Ok(appeal) => appeals.push(appeal),
            Err(err) => {
                debug!(row, error = %err, "Fila descartada");
                dropped.record(&err);
            }
        }
    }

    let report = NormalizationReport {
        rows_read: raw.len(),
        rows_kept: appeals.len(),
        dropped,
    };
    info!("Normalización completada: {report}");
    Normalized { appeals, report }
}

/// Normaliza una sola fila.
pub fn normalize_one(raw: &RawAppeal) -> Result<CanonicalAppeal, DataIntegrityError> {
    let created_raw = non_blank(&raw.created_at).ok_or(DataIntegrityError::MissingCreation)?;
    let created = parse_timestamp(created_raw).ok_or_else(|| {
        DataIntegrityError::UnparseableTimestamp {
            field: "created_at",
            value: created_raw.to_string(),
        }
    })?;

    let completed_raw =
        non_blank(&raw.completion_date).ok_or(DataIntegrityError::MissingCompletion)?;
    let completed = parse_timestamp(completed_raw).ok_or_else(|| {
        DataIntegrityError::UnparseableTimestamp {
            field: "completion_date",
            value: completed_raw.to_string(),
        }
    })?;

    let district = non_blank(&raw.district).ok_or(DataIntegrityError::MissingField("district"))?;
    let category = non_blank(&raw.category).ok_or(DataIntegrityError::MissingField("category"))?;

    let days = (completed - created).num_milliseconds() as f64 / MILLIS_PER_DAY;
    if !days.is_finite() || days < 0.0 {
        return Err(DataIntegrityError::InvalidDuration(days));
    }

    let (day_of_week, month) = calendar_codes(&created);
    Ok(CanonicalAppeal {
        district: district.to_string(),
        category: category.to_string(),
        day_of_week,
        month,
        days_to_resolve: days as f32,
    })
}

/// Interpreta las representaciones de fecha que aparecen en los datos
/// históricos. Las fechas sin zona horaria se consideran UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(created: &str, completed: Option<&str>, district: &str, category: &str) -> RawAppeal {
        RawAppeal {
            created_at: Some(created.to_string()),
            completion_date: completed.map(str::to_string),
            district: Some(district.to_string()),
            category: Some(category.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn computes_fractional_days_and_calendar_codes() {
        let appeal = normalize_one(&raw(
            "2024-01-01 00:00:00+00",
            Some("2024-01-03 12:00:00+00"),
            " Sykhiv ",
            "Lift",
        ))
        .unwrap();
        assert_eq!(appeal.district, "Sykhiv");
        assert!((appeal.days_to_resolve - 2.5).abs() < 1e-6);
        assert_eq!(appeal.day_of_week, 0);
        assert_eq!(appeal.month, 1);
    }

    #[test]
    fn accepts_mixed_timestamp_formats() {
        for s in [
            "2024-05-06T07:08:09Z",
            "2024-05-06T07:08:09.123+03:00",
            "2024-05-06 07:08:09.5+03",
            "2024-05-06 07:08:09",
            "2024-05-06 07:08",
            "06.05.2024 07:08:09",
            "06.05.2024 07:08",
            "2024-05-06",
            "06.05.2024",
        ] {
            assert!(parse_timestamp(s).is_some(), "no se pudo interpretar {s}");
        }
        assert!(parse_timestamp("ayer por la tarde").is_none());
        assert!(parse_timestamp("   ").is_none());
    }

    #[test]
    fn drops_invalid_rows_without_failing_batch() {
        let rows = vec![
            raw("2024-01-01", Some("2024-01-05"), "A", "X"),
            raw("2024-01-10", Some("2024-01-05"), "A", "X"),
            raw("2024-01-01", None, "A", "X"),
            raw("no es fecha", Some("2024-01-05"), "A", "X"),
            raw("2024-01-01", Some("2024-01-05"), "  ", "X"),
            RawAppeal::default(),
        ];
        let normalized = normalize(&rows);

        assert_eq!(normalized.appeals.len(), 1);
        let report = normalized.report;
        assert_eq!(report.rows_read, 6);
        assert_eq!(report.rows_kept, 1);
        assert_eq!(report.dropped.invalid_duration, 1);
        assert_eq!(report.dropped.missing_completion, 1);
        assert_eq!(report.dropped.unparseable_timestamp, 1);
        assert_eq!(report.dropped.missing_field, 1);
        assert_eq!(report.dropped.missing_timestamp, 1);
        assert_eq!(report.dropped.total(), 5);
    }

    #[test]
    fn never_emits_negative_targets() {
        let rows: Vec<RawAppeal> = (0..60)
            .map(|i| {
                let created = format!("2024-02-{:02} 10:00:00", 1 + i % 28);
                let completed = format!("2024-02-{:02} 09:00:00", 1 + (i * 7) % 28);
                raw(&created, Some(&completed), "A", "X")
            })
            .collect();
        let normalized = normalize(&rows);
        assert!(normalized
            .appeals
            .iter()
            .all(|a| a.days_to_resolve >= 0.0 && a.days_to_resolve.is_finite()));
    }

    #[test]
    fn unparseable_registration_is_ignored() {
        let mut row = raw("2024-01-01", Some("2024-01-02"), "A", "X");
        row.registration_date = Some("???".to_string());
        assert!(normalize_one(&row).is_ok());
    }
}
