use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServiceConfig;
use crate::engine::QueryEngine;
use crate::error::{KpiError, Result};
use crate::executor::QueryExecutor;
use crate::filters::{DateFilter, SafeText};
use crate::kpi::{CoverageFilters, FillRateFilters, KpiQuery, StockoutFilters};
use crate::pagination::ClientPage;
use crate::runtime::KpiRuntime;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<KpiRuntime>,
}

pub struct Server {
    config: Arc<ServiceConfig>,
    state: AppState,
}

#[derive(Debug, Default, Deserialize)]
pub struct FillRateParams {
    pub desde: Option<String>,
    pub hasta: Option<String>,
    pub distrito: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockoutParams {
    pub distrito: Option<String>,
    pub solo_alertas: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoverageParams {
    pub distrito: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopParams {
    pub limite: Option<u32>,
}

fn params<T>(extracted: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    extracted
        .map(|Query(p)| p)
        .map_err(|e| KpiError::Validation(e.body_text()))
}

impl Server {
    /// Validates `config`; the engine handle is shared by every request.
    pub fn new(config: ServiceConfig, engine: Arc<dyn QueryEngine>) -> Result<Self> {
        config.validate()?;
        let executor = QueryExecutor::new(engine, config.athena.clone(), config.polling.clone());
        let runtime = Arc::new(KpiRuntime::new(executor, config.pagination.clone()));
        Ok(Self {
            config: Arc::new(config),
            state: AppState { runtime },
        })
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/healthz", get(Self::health))
            .route("/healthz/engine", get(Self::engine_health))
            .route("/kpi/fill-rate", get(Self::fill_rate))
            .route("/kpi/stockout", get(Self::stockout))
            .route("/kpi/cobertura", get(Self::coverage))
            .route("/top/quiebres", get(Self::top_stockouts))
            .with_state(self.state.clone())
    }

    pub fn router(&self) -> Result<Router> {
        let root = self.config.server.root_path.as_str();
        let app = if root.is_empty() {
            self.routes()
        } else {
            Router::new().nest(root, self.routes())
        };
        Ok(app
            .layer(cors_layer(&self.config.server.allowed_origins)?)
            .layer(TraceLayer::new_for_http()))
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.server.listen_addr;
        let router = self.router()?;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, root_path = %self.config.server.root_path, "kpilake listening");
        axum::serve(listener, router).await?;
        Ok(())
    }

    async fn health() -> Json<Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn engine_health(State(state): State<AppState>) -> Result<Json<Value>> {
        let elapsed = state.runtime.ping().await?;
        Ok(Json(json!({
            "status": "ok",
            "engine": "reachable",
            "elapsed_ms": elapsed.as_millis() as u64,
        })))
    }

    async fn fill_rate(
        State(state): State<AppState>,
        query: std::result::Result<Query<FillRateParams>, QueryRejection>,
    ) -> Result<Json<ClientPage>> {
        let p = params(query)?;
        let kpi = KpiQuery::FillRate(FillRateFilters {
            from: DateFilter::parse_optional("desde", p.desde.as_deref())?,
            to: DateFilter::parse_optional("hasta", p.hasta.as_deref())?,
            district: SafeText::parse_optional("distrito", p.distrito.as_deref())?,
        });
        let page = state.runtime.page_request(p.page, p.limit)?;
        Ok(Json(state.runtime.run_page(&kpi, page).await?))
    }

    async fn stockout(
        State(state): State<AppState>,
        query: std::result::Result<Query<StockoutParams>, QueryRejection>,
    ) -> Result<Json<ClientPage>> {
        let p = params(query)?;
        let kpi = KpiQuery::Stockout(StockoutFilters {
            district: SafeText::parse_optional("distrito", p.distrito.as_deref())?,
            only_alerts: p.solo_alertas.unwrap_or(false),
        });
        let page = state.runtime.page_request(p.page, p.limit)?;
        Ok(Json(state.runtime.run_page(&kpi, page).await?))
    }

    async fn coverage(
        State(state): State<AppState>,
        query: std::result::Result<Query<CoverageParams>, QueryRejection>,
    ) -> Result<Json<ClientPage>> {
        let p = params(query)?;
        let kpi = KpiQuery::Coverage(CoverageFilters {
            district: SafeText::parse_optional("distrito", p.distrito.as_deref())?,
        });
        let page = state.runtime.page_request(p.page, p.limit)?;
        Ok(Json(state.runtime.run_page(&kpi, page).await?))
    }

    async fn top_stockouts(
        State(state): State<AppState>,
        query: std::result::Result<Query<TopParams>, QueryRejection>,
    ) -> Result<Json<Vec<Map<String, Value>>>> {
        let p = params(query)?;
        let rows = state
            .runtime
            .run_listing(&KpiQuery::TopStockouts, p.limite)
            .await?;
        Ok(Json(rows))
    }
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return Ok(layer.allow_origin(Any));
    }
    let values = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|e| KpiError::Config(format!("invalid allowed origin {o:?}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(values))
}
