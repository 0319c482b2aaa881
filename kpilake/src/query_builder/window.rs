//! Stage (c): window-function ranking and page slicing.

use crate::pagination::{PageRequest, ROW_NUMBER_COLUMN, TOTAL_COLUMN};
use crate::sql_ast::{
    OrderItem, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, TableRef, WindowFunction,
};

use super::stages::FILTERED;

pub(super) const RANKED: &str = "ranked";

fn rank_bound(rank: u64) -> SqlExpr {
    SqlExpr::Int(i64::try_from(rank).unwrap_or(i64::MAX))
}

/// `SELECT filtered.*, ROW_NUMBER() OVER (ORDER BY ...), COUNT(*) OVER () FROM filtered`
pub(super) fn rank_stage(order_by: Vec<OrderItem>) -> SelectQuery {
    SelectQuery {
        select: vec![
            SelectItem {
                expr: SqlExpr::Wildcard {
                    table: Some(FILTERED.to_string()),
                },
                alias: None,
            },
            SelectItem {
                expr: SqlExpr::Window {
                    func: WindowFunction::RowNumber,
                    order_by,
                },
                alias: Some(ROW_NUMBER_COLUMN.to_string()),
            },
            SelectItem {
                expr: SqlExpr::Window {
                    func: WindowFunction::CountAll,
                    order_by: Vec::new(),
                },
                alias: Some(TOTAL_COLUMN.to_string()),
            },
        ],
        from: TableRef::named(FILTERED),
        ..SelectQuery::default()
    }
}

/// Outer select over `ranked` keeping ranks `(page-1)*limit+1 ..= page*limit`.
///
/// When the page starts past the last rank, rank 1 is kept as well so the window
/// total still reaches the caller; the page wrapper drops it from the output.
pub(super) fn page_slice(page: PageRequest) -> SelectQuery {
    let rn = || SqlExpr::column(ROW_NUMBER_COLUMN);
    let in_window = SqlExpr::Between {
        expr: Box::new(rn()),
        low: Box::new(rank_bound(page.first_rank())),
        high: Box::new(rank_bound(page.last_rank())),
    };
    let total_carrier = SqlExpr::binary(
        SqlBinaryOperator::And,
        SqlExpr::binary(SqlBinaryOperator::Eq, rn(), SqlExpr::Int(1)),
        SqlExpr::binary(
            SqlBinaryOperator::Lt,
            SqlExpr::column(TOTAL_COLUMN),
            rank_bound(page.first_rank()),
        ),
    );

    SelectQuery {
        select: vec![SelectItem {
            expr: SqlExpr::Wildcard { table: None },
            alias: None,
        }],
        from: TableRef::named(RANKED),
        filters: vec![SqlExpr::binary(SqlBinaryOperator::Or, in_window, total_carrier)],
        order_by: vec![OrderItem::asc(ROW_NUMBER_COLUMN)],
        ..SelectQuery::default()
    }
}
