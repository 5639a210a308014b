//! Utilidades compartidas por las pruebas de integración.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use appeal_forecast::{
    config::AppConfig,
    create_router,
    models::RawAppeal,
    source::{AppealSource, InMemoryAppealSource},
    AppState,
};
use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{Duration as Days, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;

pub const DISTRICTS: [&str; 3] = ["A", "B", "C"];
pub const CATEGORIES: [&str; 3] = ["X", "Y", "Z"];

/// Corpus sintético con resoluciones de 1 a 30 días que dependen del
/// distrito y la categoría. `scale` multiplica la duración.
pub fn corpus(rows: usize, scale: i64) -> Vec<RawAppeal> {
    let start = Utc.with_ymd_and_hms(2023, 3, 1, 9, 30, 0).unwrap();
    (0..rows)
        .map(|i| {
            let d = i % 3;
            let c = (i / 3) % 3;
            let created = start + Days::hours(5 * i as i64);
            let hours = 24 * scale * (1 + d as i64 * 10 + c as i64 * 3) + (i % 7) as i64;
            RawAppeal {
                created_at: Some(created.format("%Y-%m-%d %H:%M:%S+00").to_string()),
                registration_date: Some(created.format("%Y-%m-%d %H:%M:%S+00").to_string()),
                completion_date: Some(
                    (created + Days::hours(hours))
                        .format("%Y-%m-%d %H:%M:%S+00")
                        .to_string(),
                ),
                district: Some(DISTRICTS[d].to_string()),
                category: Some(CATEGORIES[c].to_string()),
                source: Some("web".to_string()),
                content: Some(format!("Apelación número {i}")),
            }
        })
        .collect()
}

/// Corpus donde toda resolución es anterior a la creación.
pub fn reversed_corpus(rows: usize) -> Vec<RawAppeal> {
    corpus(rows, 1)
        .into_iter()
        .map(|mut row| {
            std::mem::swap(&mut row.created_at, &mut row.completion_date);
            row
        })
        .collect()
}

/// Origen que devuelve respuestas preparadas, una por lectura. Agotadas,
/// repite la última.
pub struct ScriptedSource {
    answers: Mutex<VecDeque<Result<Vec<RawAppeal>, String>>>,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(answers: Vec<Result<Vec<RawAppeal>, String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl AppealSource for ScriptedSource {
    async fn fetch_all(&self) -> Result<Vec<RawAppeal>> {
        tokio::time::sleep(self.delay).await;
        let answer = {
            let mut answers = self.answers.lock();
            if answers.len() > 1 {
                answers.pop_front()
            } else {
                answers.front().cloned()
            }
        };
        match answer {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn sample_case(&self, _district: &str, _category: &str) -> Result<Option<f64>> {
        Ok(None)
    }
}

pub fn config(artifacts: &Path) -> AppConfig {
    let artifacts = artifacts.display().to_string();
    AppConfig::from_vars(|key| match key {
        "ARTIFACTS_PATH" => Some(artifacts.clone()),
        _ => None,
    })
    .unwrap()
}

pub fn state_with(source: Option<Arc<dyn AppealSource>>, artifacts: &Path) -> AppState {
    AppState::new(config(artifacts), source)
}

pub fn server(state: AppState) -> TestServer {
    TestServer::new(create_router(state)).unwrap()
}

pub fn in_memory(rows: Vec<RawAppeal>) -> Option<Arc<dyn AppealSource>> {
    Some(Arc::new(InMemoryAppealSource::new(rows)))
}

/// Espera a que el trabajo de entrenamiento termine y devuelve su estado.
pub async fn wait_for_job(server: &TestServer) -> Value {
    for _ in 0..1200 {
        let status: Value = server.get("/train/status").await.json();
        if status["isBusy"] == Value::Bool(false) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("el entrenamiento no terminó a tiempo");
}
