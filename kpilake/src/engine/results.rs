//! Materialise every result page of a finished execution.

use std::sync::Arc;
use std::time::Instant;

use super::{ExecutionId, QueryEngine, RawResultPage};
use crate::error::{KpiError, Result};
use crate::executor::{QueryResult, ResultSchema, RowRecord};

/// Follow continuation tokens until the engine stops returning one.
///
/// Column metadata of the first page fixes the schema. Rows whose cell count does not
/// match it are dropped and logged.
pub async fn fetch_all(engine: &dyn QueryEngine, id: &ExecutionId) -> Result<QueryResult> {
    let start = Instant::now();
    let first = engine.get_query_results(id, None).await?;
    let schema = Arc::new(ResultSchema::new(first.columns.clone()));

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    let mut pages = 1usize;

    let mut next_token = collect_page(first, &schema, true, &mut rows, &mut dropped)?;
    while let Some(token) = next_token {
        let page = engine.get_query_results(id, Some(&token)).await?;
        pages += 1;
        if !page.columns.is_empty() && page.columns.as_slice() != schema.columns() {
            return Err(KpiError::Remote(format!(
                "execution {id} changed its columns on page {pages}"
            )));
        }
        next_token = collect_page(page, &schema, false, &mut rows, &mut dropped)?;
    }

    tracing::debug!(
        execution_id = %id,
        rows = rows.len(),
        dropped,
        pages,
        columns = schema.len(),
        ms = start.elapsed().as_millis(),
        "fetched results"
    );

    Ok(QueryResult { schema, rows })
}

fn collect_page(
    page: RawResultPage,
    schema: &Arc<ResultSchema>,
    first: bool,
    rows: &mut Vec<RowRecord>,
    dropped: &mut usize,
) -> Result<Option<String>> {
    let mut cells = page.rows.into_iter().peekable();
    if first {
        if let Some(header) = cells.peek() {
            if is_header(header, schema.columns()) {
                cells.next();
            }
        }
    }

    for row in cells {
        if row.len() != schema.len() {
            let err = KpiError::ResultShape {
                expected: schema.len(),
                found: row.len(),
            };
            tracing::warn!(error = %err, "dropping malformed result row");
            *dropped += 1;
            continue;
        }
        rows.push(RowRecord::new(Arc::clone(schema), row));
    }
    Ok(page.next_token)
}

fn is_header(row: &[Option<String>], columns: &[String]) -> bool {
    !columns.is_empty()
        && row.len() == columns.len()
        && row
            .iter()
            .zip(columns)
            .all(|(cell, name)| cell.as_deref() == Some(name.as_str()))
}
