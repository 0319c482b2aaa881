//! KPI SQL assembly.
//!
//! Paginated KPIs render as three chained CTE stages:
//! (a) aggregation into `base`, (b) validated predicates and derived columns in
//! `filtered`, (c) ranking plus window total in `ranked`, then an outer select slicing
//! the requested rank range.

use crate::dialect::{AthenaDialect, Dialect};
use crate::kpi::KpiQuery;
use crate::pagination::PageRequest;
use crate::sql_ast::{Cte, CteBody, SelectItem, SelectQuery, SqlExpr, SqlRenderer, TableRef};

mod stages;
mod window;

use stages::{aggregation_stage, filter_stage, ordering, FILTERED};
use window::{page_slice, rank_stage, RANKED};

pub struct SqlBuilder;

impl Default for SqlBuilder {
    fn default() -> Self {
        Self
    }
}

impl SqlBuilder {
    /// Paginated SQL for `query` in the Athena dialect.
    pub fn build_page(&self, query: &KpiQuery, page: PageRequest) -> String {
        self.build_page_with_dialect(query, page, &AthenaDialect)
    }

    /// Build paginated SQL using a provided dialect (useful for tests).
    pub fn build_page_with_dialect(
        &self,
        query: &KpiQuery,
        page: PageRequest,
        dialect: &dyn Dialect,
    ) -> String {
        let kind = query.kind();
        let mut with = aggregation_stage(kind);
        with.push(Cte {
            name: FILTERED.to_string(),
            body: CteBody::Select(Box::new(filter_stage(query))),
        });
        with.push(Cte {
            name: RANKED.to_string(),
            body: CteBody::Select(Box::new(rank_stage(ordering(kind)))),
        });

        let mut outer = page_slice(page);
        outer.with = with;
        SqlRenderer::new(dialect).render_select(&outer)
    }

    /// Unpaginated SQL returning the first `limit` rows in the KPI's order.
    pub fn build_listing(&self, query: &KpiQuery, limit: u32) -> String {
        let kind = query.kind();
        let mut with = aggregation_stage(kind);
        with.push(Cte {
            name: FILTERED.to_string(),
            body: CteBody::Select(Box::new(filter_stage(query))),
        });
        let outer = SelectQuery {
            with,
            select: vec![SelectItem {
                expr: SqlExpr::Wildcard { table: None },
                alias: None,
            }],
            from: TableRef::named(FILTERED),
            order_by: ordering(kind),
            limit: Some(u64::from(limit)),
            ..SelectQuery::default()
        };
        SqlRenderer::new(&AthenaDialect).render_select(&outer)
    }
}
