//! SQL dialect abstractions.
//!
//! Each dialect is implemented in its own file.

use crate::filters::{DateFilter, SafeText};

/// Dialects render identifiers and literal pieces. Tree walking lives in
/// [`crate::sql_ast::SqlRenderer`]; the dialect only maps leaves to SQL text.
pub trait Dialect {
    fn quote_ident(&self, ident: &str) -> String;
    fn render_text(&self, text: &SafeText) -> String {
        format!("'{}'", text.as_sql_literal_body())
    }
    fn render_date(&self, date: &DateFilter) -> String {
        format!("DATE '{}'", date.iso())
    }
}

mod athena;
pub use athena::AthenaDialect;
