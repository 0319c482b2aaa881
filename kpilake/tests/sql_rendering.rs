//! Rendering of complete KPI statements through the public builder.

use kpilake::dialect::Dialect;
use kpilake::filters::{DateFilter, SafeText};
use kpilake::kpi::{CoverageFilters, FillRateFilters, KpiQuery, StockoutFilters};
use kpilake::{PageRequest, SqlBuilder};
use pretty_assertions::assert_eq;

struct BacktickDialect;

impl Dialect for BacktickDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }
}

fn page(page: u32, limit: u32) -> PageRequest {
    PageRequest::new(page, limit, 500).expect("valid page")
}

fn all_paginated() -> Vec<KpiQuery> {
    vec![
        KpiQuery::FillRate(FillRateFilters::default()),
        KpiQuery::Stockout(StockoutFilters::default()),
        KpiQuery::Coverage(CoverageFilters::default()),
    ]
}

#[test]
fn stages_appear_in_order_for_every_kpi() {
    for query in all_paginated() {
        let sql = SqlBuilder.build_page(&query, page(1, 50));
        let base = sql.find("\"base\" AS (").expect("base stage");
        let filtered = sql.find("\"filtered\" AS (").expect("filtered stage");
        let ranked = sql.find("\"ranked\" AS (").expect("ranked stage");
        let outer = sql.rfind("SELECT * FROM \"ranked\"").expect("outer slice");
        assert!(base < filtered && filtered < ranked && ranked < outer, "{sql}");
    }
}

#[test]
fn window_moves_with_the_page() {
    let query = KpiQuery::Coverage(CoverageFilters::default());
    for (p, lo, hi) in [(1, 1, 25), (2, 26, 50), (7, 151, 175)] {
        let sql = SqlBuilder.build_page(&query, page(p, 25));
        assert!(
            sql.contains(&format!("(\"kpi_row_num\" BETWEEN {lo} AND {hi})")),
            "{sql}"
        );
        assert!(
            sql.contains(&format!("(\"kpi_total_rows\" < {lo})")),
            "{sql}"
        );
    }
}

#[test]
fn dialect_controls_identifier_quoting() {
    let query = KpiQuery::FillRate(FillRateFilters {
        from: Some(DateFilter::parse("desde", "2024-02-01").unwrap()),
        to: None,
        district: Some(SafeText::parse("distrito", "San Isidro").unwrap()),
    });
    let sql = SqlBuilder.build_page_with_dialect(&query, page(1, 10), &BacktickDialect);

    assert!(sql.contains(
        "`filtered` AS (SELECT `base`.* FROM `base` WHERE (`dia` >= DATE '2024-02-01') \
         AND (`distrito` = 'San Isidro'))"
    ));
    assert!(sql.ends_with(
        "SELECT * FROM `ranked` WHERE ((`kpi_row_num` BETWEEN 1 AND 10) OR \
         ((`kpi_row_num` = 1) AND (`kpi_total_rows` < 1))) ORDER BY `kpi_row_num` ASC"
    ));
    assert!(!sql.contains('"'));
}

#[test]
fn coverage_district_filter_and_null_ordering() {
    let query = KpiQuery::Coverage(CoverageFilters {
        district: Some(SafeText::parse("distrito", "Norte").unwrap()),
    });
    let sql = SqlBuilder.build_page(&query, page(1, 50));

    let filtered = sql
        .split("\"filtered\" AS (")
        .nth(1)
        .and_then(|rest| rest.split(", \"ranked\"").next())
        .expect("filtered stage");
    assert_eq!(
        filtered,
        "SELECT \"base\".* FROM \"base\" WHERE (\"distrito\" = 'Norte'))"
    );
    assert!(sql.contains(
        "ROW_NUMBER() OVER (ORDER BY \"dias_cobertura\" ASC NULLS FIRST, \"id_sucursal\" ASC, \
         \"id_producto\" ASC)"
    ));
}

#[test]
fn stockout_without_alert_filter_still_derives_alert() {
    let query = KpiQuery::Stockout(StockoutFilters {
        district: None,
        only_alerts: false,
    });
    let sql = SqlBuilder.build_page(&query, page(1, 50));
    assert!(sql.contains(
        "\"filtered\" AS (SELECT \"base\".*, (\"stock_actual\" <= \"umbral_reposicion\") AS \
         \"alerta\" FROM \"base\")"
    ));
}
