//! Page/limit/total envelope over window-ranked result sets.
//!
//! Paginated KPI SQL ranks the filtered rows with `ROW_NUMBER()` and carries the size of
//! the filtered set on every row as `COUNT(*) OVER ()`, so one statement yields both the
//! page and a total consistent with it.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::coercion::{decode_row, FieldSpec};
use crate::error::{KpiError, Result};
use crate::executor::QueryResult;

/// Rank column added by the ranking stage.
pub const ROW_NUMBER_COLUMN: &str = "kpi_row_num";
/// Window count of the filtered set, repeated on every ranked row.
pub const TOTAL_COLUMN: &str = "kpi_total_rows";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// `page >= 1` and `1 <= limit <= max_limit`.
    pub fn new(page: u32, limit: u32, max_limit: u32) -> Result<Self> {
        if page == 0 {
            return Err(KpiError::Validation("page must be >= 1".to_string()));
        }
        if limit == 0 || limit > max_limit {
            return Err(KpiError::Validation(format!(
                "limit must be between 1 and {max_limit}"
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// First rank on the page (1-based, inclusive).
    pub fn first_rank(&self) -> u64 {
        (u64::from(self.page) - 1) * u64::from(self.limit) + 1
    }

    /// Last rank on the page (inclusive).
    pub fn last_rank(&self) -> u64 {
        u64::from(self.page) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientPage {
    pub meta: PageMeta,
    pub data: Vec<Map<String, Value>>,
}

impl ClientPage {
    /// Wrap a ranked result set.
    ///
    /// Rows ranked outside the requested window are discarded; past the last page the
    /// ranked query still returns rank 1 so the total stays known.
    pub fn from_ranked(result: &QueryResult, request: PageRequest, fields: &[FieldSpec]) -> Result<Self> {
        let total = read_total(result)?;
        let window = request.first_rank()..=request.last_rank();

        let mut data = Vec::with_capacity(request.limit() as usize);
        for row in &result.rows {
            let rank = parse_count(row.get(ROW_NUMBER_COLUMN), ROW_NUMBER_COLUMN)?;
            if !window.contains(&rank) {
                continue;
            }
            data.push(decode_row(row, fields));
        }

        Ok(Self {
            meta: PageMeta {
                page: request.page(),
                limit: request.limit(),
                total,
                has_more: request.last_rank() < total,
            },
            data,
        })
    }
}

fn read_total(result: &QueryResult) -> Result<u64> {
    let Some(first) = result.rows.first() else {
        return Ok(0);
    };
    let total = parse_count(first.get(TOTAL_COLUMN), TOTAL_COLUMN)?;
    if result
        .rows
        .iter()
        .any(|row| row.get(TOTAL_COLUMN) != first.get(TOTAL_COLUMN))
    {
        tracing::warn!(total, "window total differs across rows; using the first");
    }
    Ok(total)
}

fn parse_count(cell: Option<&str>, column: &str) -> Result<u64> {
    let text = cell.ok_or_else(|| KpiError::Remote(format!("ranked result is missing {column}")))?;
    text.trim()
        .parse::<u64>()
        .map_err(|_| KpiError::Remote(format!("{column} is not a row count: {text:?}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::coercion::{Decode, NullPolicy};
    use crate::executor::{ResultSchema, RowRecord};

    const FIELDS: &[FieldSpec] = &[FieldSpec::new("name", Decode::Text, NullPolicy::Null)];

    /// Emulates the ranked query over `total` rows for the given page.
    fn ranked(total: u64, request: PageRequest) -> QueryResult {
        let schema = Arc::new(ResultSchema::new(vec![
            "name".into(),
            ROW_NUMBER_COLUMN.into(),
            TOTAL_COLUMN.into(),
        ]));
        let rows = (1..=total)
            .filter(|rn| {
                (request.first_rank()..=request.last_rank()).contains(rn)
                    || (*rn == 1 && total < request.first_rank())
            })
            .map(|rn| {
                RowRecord::new(
                    Arc::clone(&schema),
                    vec![
                        Some(format!("row-{rn}")),
                        Some(rn.to_string()),
                        Some(total.to_string()),
                    ],
                )
            })
            .collect();
        QueryResult { schema, rows }
    }

    #[test]
    fn page_bounds() {
        assert!(PageRequest::new(0, 10, 500).is_err());
        assert!(PageRequest::new(1, 0, 500).is_err());
        assert!(PageRequest::new(1, 501, 500).is_err());
        let req = PageRequest::new(3, 20, 500).unwrap();
        assert_eq!(req.first_rank(), 41);
        assert_eq!(req.last_rank(), 60);
    }

    #[test]
    fn first_page_of_three() {
        let req = PageRequest::new(1, 2, 500).unwrap();
        let page = ClientPage::from_ranked(&ranked(3, req), req, FIELDS).unwrap();
        assert_eq!(
            page.meta,
            PageMeta {
                page: 1,
                limit: 2,
                total: 3,
                has_more: true
            }
        );
        assert_eq!(
            serde_json::to_value(&page.data).unwrap(),
            json!([{"name": "row-1"}, {"name": "row-2"}])
        );
    }

    #[test]
    fn page_past_the_end_keeps_total() {
        let req = PageRequest::new(5, 2, 500).unwrap();
        let page = ClientPage::from_ranked(&ranked(3, req), req, FIELDS).unwrap();
        assert_eq!(page.meta.total, 3);
        assert!(!page.meta.has_more);
        assert!(page.data.is_empty());
    }

    #[test]
    fn empty_set_on_any_page() {
        for p in [1, 2, 7] {
            let req = PageRequest::new(p, 10, 500).unwrap();
            let page = ClientPage::from_ranked(&ranked(0, req), req, FIELDS).unwrap();
            assert_eq!(page.meta.total, 0);
            assert!(!page.meta.has_more);
            assert!(page.data.is_empty());
        }
    }

    #[test]
    fn has_more_and_length_invariants() {
        for total in 0..12u64 {
            for limit in 1..5u32 {
                for p in 1..6u32 {
                    let req = PageRequest::new(p, limit, 500).unwrap();
                    let page = ClientPage::from_ranked(&ranked(total, req), req, FIELDS).unwrap();
                    let skipped = u64::from(p - 1) * u64::from(limit);
                    let expected_len = total.saturating_sub(skipped).min(u64::from(limit));
                    assert_eq!(page.meta.total, total);
                    assert_eq!(page.meta.has_more, u64::from(p) * u64::from(limit) < total);
                    assert_eq!(page.data.len() as u64, expected_len);
                }
            }
        }
    }

    #[test]
    fn serializes_meta_envelope() {
        let req = PageRequest::new(2, 1, 500).unwrap();
        let page = ClientPage::from_ranked(&ranked(2, req), req, FIELDS).unwrap();
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            json!({
                "meta": {"page": 2, "limit": 1, "total": 2, "has_more": false},
                "data": [{"name": "row-2"}]
            })
        );
    }

    #[test]
    fn missing_total_is_an_engine_error() {
        let schema = Arc::new(ResultSchema::new(vec!["name".into()]));
        let result = QueryResult {
            rows: vec![RowRecord::new(Arc::clone(&schema), vec![Some("x".into())])],
            schema,
        };
        let req = PageRequest::new(1, 1, 500).unwrap();
        assert!(matches!(
            ClientPage::from_ranked(&result, req, FIELDS),
            Err(KpiError::Remote(_))
        ));
    }
}
