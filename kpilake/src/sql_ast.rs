//! Typed SQL syntax tree and renderer.
//!
//! Literal text enters the tree only as a validated filter ([`SafeText`], [`DateFilter`])
//! or as a `&'static str` fragment written in this crate.

use crate::dialect::Dialect;
use crate::filters::{DateFilter, SafeText};

#[derive(Debug, Clone)]
pub enum SqlExpr {
    Column {
        name: String,
    },
    /// `*` or `table.*`
    Wildcard {
        table: Option<String>,
    },
    Text(SafeText),
    Date(DateFilter),
    Int(i64),
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Between {
        expr: Box<SqlExpr>,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
    },
    Window {
        func: WindowFunction,
        order_by: Vec<OrderItem>,
    },
}

impl SqlExpr {
    pub fn column(name: impl Into<String>) -> Self {
        SqlExpr::Column { name: name.into() }
    }

    pub fn binary(op: SqlBinaryOperator, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    And,
    Or,
    Eq,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunction {
    RowNumber,
    CountAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
    /// Emits `NULLS FIRST`; otherwise the engine default applies.
    pub nulls_first: bool,
}

impl OrderItem {
    pub fn asc(column: &str) -> Self {
        Self {
            expr: SqlExpr::column(column),
            direction: SortDirection::Asc,
            nulls_first: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            expr: SqlExpr::column(column),
            direction: SortDirection::Desc,
            nulls_first: false,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls_first = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TableRef {
    pub name: String,
}

impl TableRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Common table expression.
#[derive(Debug, Clone)]
pub struct Cte {
    pub name: String,
    pub body: CteBody,
}

#[derive(Debug, Clone)]
pub enum CteBody {
    Fragment(&'static str),
    Select(Box<SelectQuery>),
}

#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub with: Vec<Cte>,
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub filters: Vec<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn render_select(&self, query: &SelectQuery) -> String {
        let mut sql = String::new();

        if !query.with.is_empty() {
            let ctes: Vec<String> = query
                .with
                .iter()
                .map(|cte| {
                    let body = match &cte.body {
                        CteBody::Fragment(text) => text.trim().to_string(),
                        CteBody::Select(select) => self.render_select(select),
                    };
                    format!("{} AS ({body})", self.dialect.quote_ident(&cte.name))
                })
                .collect();
            sql.push_str(&format!("WITH {} ", ctes.join(", ")));
        }

        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr);
                match &item.alias {
                    Some(alias) => format!("{expr_sql} AS {}", self.dialect.quote_ident(alias)),
                    None => expr_sql,
                }
            })
            .collect();

        sql.push_str(&format!(
            "SELECT {} FROM {}",
            select_items.join(", "),
            self.dialect.quote_ident(&query.from.name)
        ));

        if !query.filters.is_empty() {
            let filters: Vec<String> = query.filters.iter().map(|f| self.render_expr(f)).collect();
            sql.push_str(&format!(" WHERE {}", filters.join(" AND ")));
        }

        if !query.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.render_order(&query.order_by)));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        sql
    }

    fn render_order(&self, items: &[OrderItem]) -> String {
        items
            .iter()
            .map(|o| {
                let expr = self.render_expr(&o.expr);
                let dir = match o.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                if o.nulls_first {
                    format!("{expr} {dir} NULLS FIRST")
                } else {
                    format!("{expr} {dir}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_expr(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Column { name } => self.dialect.quote_ident(name),
            SqlExpr::Wildcard { table } => match table {
                Some(t) => format!("{}.*", self.dialect.quote_ident(t)),
                None => "*".to_string(),
            },
            SqlExpr::Text(text) => self.dialect.render_text(text),
            SqlExpr::Date(date) => self.dialect.render_date(date),
            SqlExpr::Int(i) => i.to_string(),
            SqlExpr::BinaryOp { op, left, right } => {
                let op_sql = match op {
                    SqlBinaryOperator::And => "AND",
                    SqlBinaryOperator::Or => "OR",
                    SqlBinaryOperator::Eq => "=",
                    SqlBinaryOperator::Gte => ">=",
                    SqlBinaryOperator::Lt => "<",
                    SqlBinaryOperator::Lte => "<=",
                };
                format!(
                    "({} {} {})",
                    self.render_expr(left),
                    op_sql,
                    self.render_expr(right)
                )
            }
            SqlExpr::Between { expr, low, high } => format!(
                "({} BETWEEN {} AND {})",
                self.render_expr(expr),
                self.render_expr(low),
                self.render_expr(high)
            ),
            SqlExpr::Window { func, order_by } => {
                let func_sql = match func {
                    WindowFunction::RowNumber => "ROW_NUMBER()",
                    WindowFunction::CountAll => "COUNT(*)",
                };
                if order_by.is_empty() {
                    format!("{func_sql} OVER ()")
                } else {
                    format!("{func_sql} OVER (ORDER BY {})", self.render_order(order_by))
                }
            }
        }
    }
}
