//! Validation of free-text request filters.
//!
//! Text only reaches SQL through [`SafeText`] or [`DateFilter`]; both are produced
//! exclusively by the checks in this module.

use std::fmt;

use chrono::NaiveDate;

use crate::error::{KpiError, Result};

/// Characters a free-text filter may contain: `[a-zA-Z0-9_ -]`.
fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '-')
}

/// A filter value that passed the allow-list, escaped for a single-quoted SQL literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafeText(String);

impl SafeText {
    /// Check `value` against the allow-list. `field` names the parameter in the error.
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        if value.is_empty() || !value.chars().all(is_allowed) {
            return Err(KpiError::Validation(format!(
                "{field} contains characters outside [a-zA-Z0-9_ -]"
            )));
        }
        Ok(Self(value.replace('\'', "''")))
    }

    /// Same as [`SafeText::parse`], passing absent values through.
    pub fn parse_optional(field: &str, value: Option<&str>) -> Result<Option<Self>> {
        value.map(|v| Self::parse(field, v)).transpose()
    }

    /// Literal body, already escaped; the caller adds the surrounding quotes.
    pub fn as_sql_literal_body(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SafeText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `YYYY-MM-DD` date filter. Date text goes through the same allow-list as every other
/// free-text filter before it is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateFilter(NaiveDate);

impl DateFilter {
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        let checked = SafeText::parse(field, value)?;
        NaiveDate::parse_from_str(checked.as_sql_literal_body(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| KpiError::Validation(format!("{field} must be a YYYY-MM-DD date")))
    }

    pub fn parse_optional(field: &str, value: Option<&str>) -> Result<Option<Self>> {
        value.map(|v| Self::parse(field, v)).transpose()
    }

    /// ISO text used inside the generated literal.
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allow_listed_text() {
        let v = SafeText::parse("distrito", "San Isidro-2_b").unwrap();
        assert_eq!(v.as_sql_literal_body(), "San Isidro-2_b");
        assert_eq!(SafeText::parse_optional("distrito", None).unwrap(), None);
    }

    #[test]
    fn rejects_metacharacters() {
        for bad in [
            "Lima' OR '1'='1",
            "x;DROP TABLE stock",
            "a/*b*/",
            "tab\there",
            "Ñuñoa",
            "",
            "50%",
        ] {
            let err = SafeText::parse("distrito", bad).unwrap_err();
            assert!(matches!(err, KpiError::Validation(_)), "{bad:?} accepted");
        }
    }

    #[test]
    fn dates_use_the_allow_list() {
        let d = DateFilter::parse("desde", "2024-03-01").unwrap();
        assert_eq!(d.iso(), "2024-03-01");
        assert!(DateFilter::parse("desde", "2024-03-01') OR ('1'='1").is_err());
        assert!(DateFilter::parse("desde", "2024-13-01").is_err());
        assert!(DateFilter::parse("desde", "yesterday").is_err());
        assert_eq!(DateFilter::parse_optional("hasta", None).unwrap(), None);
    }
}
