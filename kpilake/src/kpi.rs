//! KPI catalogue: typed requests and declared output shapes.

use crate::coercion::{Decode, FieldSpec, NullPolicy};
use crate::filters::{DateFilter, SafeText};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KpiKind {
    FillRate,
    Stockout,
    Coverage,
    TopStockouts,
}

/// Fill rate per day and district.
///
/// | field | decode | null |
/// |---|---|---|
/// | `dia` | text (`YYYY-MM-DD`) | null |
/// | `distrito` | text | null |
/// | `recetado` | numeric | 0 |
/// | `dispensado` | numeric | 0 |
/// | `fill_rate` | numeric | null (nothing prescribed) |
pub const FILL_RATE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("dia", Decode::Text, NullPolicy::Null),
    FieldSpec::new("distrito", Decode::Text, NullPolicy::Null),
    FieldSpec::new("recetado", Decode::Numeric, NullPolicy::Zero),
    FieldSpec::new("dispensado", Decode::Numeric, NullPolicy::Zero),
    FieldSpec::new("fill_rate", Decode::Numeric, NullPolicy::Null),
];

/// Stock against replenishment threshold per district and product.
///
/// | field | decode | null |
/// |---|---|---|
/// | `distrito` | text | null |
/// | `id_producto` | text | null |
/// | `stock_actual` | numeric | 0 |
/// | `umbral_reposicion` | numeric | 0 |
/// | `alerta` | boolean | false |
pub const STOCKOUT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("distrito", Decode::Text, NullPolicy::Null),
    FieldSpec::new("id_producto", Decode::Text, NullPolicy::Null),
    FieldSpec::new("stock_actual", Decode::Numeric, NullPolicy::Zero),
    FieldSpec::new("umbral_reposicion", Decode::Numeric, NullPolicy::Zero),
    FieldSpec::new("alerta", Decode::Boolean, NullPolicy::Zero),
];

/// Days of coverage per branch and product, from 30-day average demand.
///
/// | field | decode | null |
/// |---|---|---|
/// | `id_sucursal` | numeric | null |
/// | `distrito` | text | omitted |
/// | `id_producto` | text | null |
/// | `stock_actual` | numeric | 0 |
/// | `demanda_diaria` | numeric | null (no recent demand) |
/// | `dias_cobertura` | numeric | null (no recent demand) |
pub const COVERAGE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id_sucursal", Decode::Numeric, NullPolicy::Null),
    FieldSpec::new("distrito", Decode::Text, NullPolicy::Omit),
    FieldSpec::new("id_producto", Decode::Text, NullPolicy::Null),
    FieldSpec::new("stock_actual", Decode::Numeric, NullPolicy::Zero),
    FieldSpec::new("demanda_diaria", Decode::Numeric, NullPolicy::Null),
    FieldSpec::new("dias_cobertura", Decode::Numeric, NullPolicy::Null),
];

/// Products with the most days in stock-out alert over the last week.
///
/// | field | decode | null |
/// |---|---|---|
/// | `codigo_atc` | text | null |
/// | `nombre` | text | null |
/// | `dias_en_alerta` | numeric | 0 |
pub const TOP_STOCKOUT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("codigo_atc", Decode::Text, NullPolicy::Null),
    FieldSpec::new("nombre", Decode::Text, NullPolicy::Null),
    FieldSpec::new("dias_en_alerta", Decode::Numeric, NullPolicy::Zero),
];

impl KpiKind {
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            KpiKind::FillRate => FILL_RATE_FIELDS,
            KpiKind::Stockout => STOCKOUT_FIELDS,
            KpiKind::Coverage => COVERAGE_FIELDS,
            KpiKind::TopStockouts => TOP_STOCKOUT_FIELDS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KpiKind::FillRate => "fill_rate",
            KpiKind::Stockout => "stockout",
            KpiKind::Coverage => "coverage",
            KpiKind::TopStockouts => "top_stockouts",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillRateFilters {
    pub from: Option<DateFilter>,
    pub to: Option<DateFilter>,
    pub district: Option<SafeText>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockoutFilters {
    pub district: Option<SafeText>,
    pub only_alerts: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageFilters {
    pub district: Option<SafeText>,
}

/// A validated KPI request. Only validated filter types can be carried here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KpiQuery {
    FillRate(FillRateFilters),
    Stockout(StockoutFilters),
    Coverage(CoverageFilters),
    TopStockouts,
}

impl KpiQuery {
    pub fn kind(&self) -> KpiKind {
        match self {
            KpiQuery::FillRate(_) => KpiKind::FillRate,
            KpiQuery::Stockout(_) => KpiKind::Stockout,
            KpiQuery::Coverage(_) => KpiKind::Coverage,
            KpiQuery::TopStockouts => KpiKind::TopStockouts,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn field_names_are_unique_per_kpi() {
        for kind in [
            KpiKind::FillRate,
            KpiKind::Stockout,
            KpiKind::Coverage,
            KpiKind::TopStockouts,
        ] {
            let names: HashSet<_> = kind.fields().iter().map(|f| f.name).collect();
            assert_eq!(names.len(), kind.fields().len(), "{}", kind.name());
        }
    }

    #[test]
    fn alert_is_boolean() {
        let alert = STOCKOUT_FIELDS.iter().find(|f| f.name == "alerta").unwrap();
        assert_eq!(alert.decode, Decode::Boolean);
    }
}
