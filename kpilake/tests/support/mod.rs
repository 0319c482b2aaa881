//! Shared harness: a service wired to an in-process engine that emulates the lake.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use kpilake::engine::{QuerySubmission, RawResultPage};
use kpilake::{ExecutionScript, ScriptedEngine, Server, ServiceConfig};
use serde_json::Value;
use tower::ServiceExt;

pub const DATABASE: &str = "farmacia";
pub const OUTPUT: &str = "s3://kpi-results/athena/";

pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.athena.database = DATABASE.to_string();
    config.athena.output_location = OUTPUT.to_string();
    config
}

/// Rows of one KPI's filtered set, in ranking order.
#[derive(Clone)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Dataset {
    /// `n` fill-rate rows, one per district.
    pub fn fill_rate(n: usize) -> Self {
        Self {
            columns: ["dia", "distrito", "recetado", "dispensado", "fill_rate"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rows: (1..=n)
                .map(|i| {
                    vec![
                        Some("2024-01-15".to_string()),
                        Some(format!("D{i:03}")),
                        Some("10".to_string()),
                        Some("9".to_string()),
                        Some("0.9".to_string()),
                    ]
                })
                .collect(),
        }
    }

    pub fn top_stockouts(n: usize) -> Self {
        Self {
            columns: ["codigo_atc", "nombre", "dias_en_alerta"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rows: (1..=n)
                .map(|i| {
                    vec![
                        Some(format!("N02BE{i:02}")),
                        Some(format!("producto {i}")),
                        Some((100 - i).to_string()),
                    ]
                })
                .collect(),
        }
    }
}

/// `"kpi_row_num" BETWEEN lo AND hi` bounds of a paginated statement.
fn window_bounds(sql: &str) -> Option<(u64, u64)> {
    let rest = sql.split("BETWEEN ").nth(1)?;
    let mut parts = rest.splitn(2, " AND ");
    let lo = parts.next()?.trim().parse().ok()?;
    let hi = parts.next()?.split(')').next()?.trim().parse().ok()?;
    Some((lo, hi))
}

fn trailing_limit(sql: &str) -> Option<usize> {
    sql.rsplit("LIMIT ").next()?.trim().parse().ok()
}

/// Answers like the lake would: ranked statements get their window (plus the rank-1
/// carrier past the end), listings get their `LIMIT`. Results start with a header row
/// and are split into pages of `page_rows`.
pub fn lake_responder(
    dataset: Dataset,
    page_rows: usize,
) -> impl Fn(&QuerySubmission) -> ExecutionScript + Send + Sync + 'static {
    move |submission: &QuerySubmission| {
        let sql = submission.sql();
        let total = dataset.rows.len() as u64;
        let (mut columns, rows): (Vec<String>, Vec<Vec<Option<String>>>) =
            if let Some((lo, hi)) = window_bounds(sql) {
                let mut columns = dataset.columns.clone();
                columns.push("kpi_row_num".to_string());
                columns.push("kpi_total_rows".to_string());
                let rows = dataset
                    .rows
                    .iter()
                    .enumerate()
                    .map(|(i, row)| (i as u64 + 1, row))
                    .filter(|(rank, _)| (lo..=hi).contains(rank) || (*rank == 1 && total < lo))
                    .map(|(rank, row)| {
                        let mut row = row.clone();
                        row.push(Some(rank.to_string()));
                        row.push(Some(total.to_string()));
                        row
                    })
                    .collect();
                (columns, rows)
            } else if let Some(limit) = trailing_limit(sql) {
                (
                    dataset.columns.clone(),
                    dataset.rows.iter().take(limit).cloned().collect(),
                )
            } else {
                (vec!["_col0".to_string()], vec![vec![Some("1".to_string())]])
            };

        let mut cells = vec![columns.iter().cloned().map(Some).collect::<Vec<_>>()];
        cells.extend(rows);
        let pages = cells
            .chunks(page_rows.max(1))
            .enumerate()
            .map(|(i, chunk)| RawResultPage {
                columns: if i == 0 {
                    std::mem::take(&mut columns)
                } else {
                    Vec::new()
                },
                rows: chunk.to_vec(),
                next_token: None,
            })
            .collect();
        ExecutionScript::succeeded(pages)
    }
}

pub struct Harness {
    pub engine: Arc<ScriptedEngine>,
    pub router: Router,
}

impl Harness {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self::with_config(test_config(), engine)
    }

    pub fn with_config(config: ServiceConfig, engine: ScriptedEngine) -> Self {
        let engine = Arc::new(engine);
        let router = Server::new(config, engine.clone())
            .expect("valid test config")
            .router()
            .expect("router builds");
        Self { engine, router }
    }

    pub fn lake(dataset: Dataset) -> Self {
        Self::new(ScriptedEngine::new(lake_responder(dataset, 1000)))
    }

    pub async fn get(&self, uri: &str) -> Response {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request builds");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        read_json(self.get(uri).await).await
    }
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let value = serde_json::from_slice(&bytes).expect("body is JSON");
    (status, value)
}
