use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::coercion::decode_row;
use crate::config::PaginationConfig;
use crate::error::{KpiError, Result};
use crate::executor::QueryExecutor;
use crate::kpi::{KpiKind, KpiQuery};
use crate::pagination::{ClientPage, PageRequest};
use crate::query_builder::SqlBuilder;

/// Serves KPI requests: build SQL, run it remotely, shape the rows.
///
/// Identical concurrent requests each run their own remote execution.
pub struct KpiRuntime {
    executor: QueryExecutor,
    builder: SqlBuilder,
    pagination: PaginationConfig,
}

impl KpiRuntime {
    pub fn new(executor: QueryExecutor, pagination: PaginationConfig) -> Self {
        Self {
            executor,
            builder: SqlBuilder,
            pagination,
        }
    }

    /// Resolve optional page parameters against the configured defaults and bounds.
    pub fn page_request(&self, page: Option<u32>, limit: Option<u32>) -> Result<PageRequest> {
        PageRequest::new(
            page.unwrap_or(1),
            limit.unwrap_or(self.pagination.default_limit),
            self.pagination.max_limit,
        )
    }

    pub async fn run_page(&self, query: &KpiQuery, page: PageRequest) -> Result<ClientPage> {
        let kind = query.kind();
        if kind == KpiKind::TopStockouts {
            return Err(KpiError::Validation(format!(
                "{} is not a paginated KPI",
                kind.name()
            )));
        }
        let sql = self.builder.build_page(query, page);
        let result = self.executor.execute(&sql).await?;
        let page = ClientPage::from_ranked(&result, page, kind.fields())?;
        tracing::debug!(
            kpi = kind.name(),
            page = page.meta.page,
            total = page.meta.total,
            rows = page.data.len(),
            "kpi page served"
        );
        Ok(page)
    }

    /// Top-N listing; `limit` defaults to and is bounded by the `top_*` settings.
    pub async fn run_listing(
        &self,
        query: &KpiQuery,
        limit: Option<u32>,
    ) -> Result<Vec<Map<String, Value>>> {
        let limit = limit.unwrap_or(self.pagination.top_default);
        if limit == 0 || limit > self.pagination.top_max {
            return Err(KpiError::Validation(format!(
                "limite must be between 1 and {}",
                self.pagination.top_max
            )));
        }
        let kind = query.kind();
        let sql = self.builder.build_listing(query, limit);
        let result = self.executor.execute(&sql).await?;
        Ok(result
            .rows
            .iter()
            .map(|row| decode_row(row, kind.fields()))
            .collect())
    }

    /// Run a no-op statement through the whole remote path.
    pub async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        self.executor.execute("SELECT 1").await?;
        Ok(start.elapsed())
    }
}
