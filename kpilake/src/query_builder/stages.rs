//! Aggregation and filtering stages of each KPI.

use crate::kpi::{KpiKind, KpiQuery};
use crate::sql_ast::{
    Cte, CteBody, OrderItem, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, TableRef,
};

pub(super) const BASE: &str = "base";
pub(super) const FILTERED: &str = "filtered";

const FILL_RATE_BASE: &str = "
    SELECT CAST(date_trunc('day', r.fecha_receta) AS date) AS dia,
           s.distrito AS distrito,
           SUM(d.cantidad) AS recetado,
           SUM(COALESCE(x.cantidad_total, 0)) AS dispensado,
           CAST(SUM(COALESCE(x.cantidad_total, 0)) AS double) / NULLIF(SUM(d.cantidad), 0) AS fill_rate
    FROM receta r
    JOIN receta_detalle d ON r.id_receta = d.id_receta
    JOIN sucursal s ON s.id_sucursal = r.id_sucursal
    LEFT JOIN dispensacion x ON x.id_receta = r.id_receta
    GROUP BY 1, 2
";

const STOCKOUT_BASE: &str = "
    SELECT s.distrito AS distrito,
           st.id_producto AS id_producto,
           SUM(st.stock_actual) AS stock_actual,
           MIN(st.umbral_reposicion) AS umbral_reposicion
    FROM stock st
    JOIN sucursal s ON s.id_sucursal = st.id_sucursal
    GROUP BY s.distrito, st.id_producto
";

const COVERAGE_DEMAND: &str = "
    SELECT r.id_sucursal AS id_sucursal,
           d.id_producto AS id_producto,
           AVG(d.cantidad) AS demanda_diaria
    FROM receta r
    JOIN receta_detalle d ON r.id_receta = d.id_receta
    WHERE r.fecha_receta >= date_add('day', -30, current_date)
    GROUP BY r.id_sucursal, d.id_producto
";

const COVERAGE_BASE: &str = "
    SELECT st.id_sucursal AS id_sucursal,
           s.distrito AS distrito,
           st.id_producto AS id_producto,
           st.stock_actual AS stock_actual,
           dm.demanda_diaria AS demanda_diaria,
           CASE WHEN dm.demanda_diaria > 0 THEN st.stock_actual / dm.demanda_diaria ELSE NULL END AS dias_cobertura
    FROM stock st
    JOIN sucursal s ON s.id_sucursal = st.id_sucursal
    LEFT JOIN demanda dm ON dm.id_sucursal = st.id_sucursal AND dm.id_producto = st.id_producto
";

const TOP_STOCKOUTS_BASE: &str = "
    SELECT p.codigo_atc AS codigo_atc,
           p.nombre AS nombre,
           COUNT(*) AS dias_en_alerta
    FROM v_alertas_stockout_diario a
    JOIN catalogo_producto p ON p.id_producto = a.id_producto
    WHERE a.dia >= date_add('day', -7, current_date)
    GROUP BY p.codigo_atc, p.nombre
";

/// Stage (a): CTEs ending in `base`, one row per grouping key.
pub(super) fn aggregation_stage(kind: KpiKind) -> Vec<Cte> {
    let fragment = |name: &str, sql: &'static str| Cte {
        name: name.to_string(),
        body: CteBody::Fragment(sql),
    };
    match kind {
        KpiKind::FillRate => vec![fragment(BASE, FILL_RATE_BASE)],
        KpiKind::Stockout => vec![fragment(BASE, STOCKOUT_BASE)],
        KpiKind::Coverage => vec![
            fragment("demanda", COVERAGE_DEMAND),
            fragment(BASE, COVERAGE_BASE),
        ],
        KpiKind::TopStockouts => vec![fragment(BASE, TOP_STOCKOUTS_BASE)],
    }
}

fn stock_alert() -> SqlExpr {
    SqlExpr::binary(
        SqlBinaryOperator::Lte,
        SqlExpr::column("stock_actual"),
        SqlExpr::column("umbral_reposicion"),
    )
}

fn eq_text(column: &str, value: &crate::filters::SafeText) -> SqlExpr {
    SqlExpr::binary(
        SqlBinaryOperator::Eq,
        SqlExpr::column(column),
        SqlExpr::Text(value.clone()),
    )
}

/// Stage (b): `SELECT base.*, <derived> FROM base WHERE <validated predicates>`.
pub(super) fn filter_stage(query: &KpiQuery) -> SelectQuery {
    let mut select = vec![SelectItem {
        expr: SqlExpr::Wildcard {
            table: Some(BASE.to_string()),
        },
        alias: None,
    }];
    let mut filters = Vec::new();

    match query {
        KpiQuery::FillRate(f) => {
            if let Some(from) = f.from {
                filters.push(SqlExpr::binary(
                    SqlBinaryOperator::Gte,
                    SqlExpr::column("dia"),
                    SqlExpr::Date(from),
                ));
            }
            if let Some(to) = f.to {
                filters.push(SqlExpr::binary(
                    SqlBinaryOperator::Lte,
                    SqlExpr::column("dia"),
                    SqlExpr::Date(to),
                ));
            }
            if let Some(district) = &f.district {
                filters.push(eq_text("distrito", district));
            }
        }
        KpiQuery::Stockout(f) => {
            select.push(SelectItem {
                expr: stock_alert(),
                alias: Some("alerta".to_string()),
            });
            if let Some(district) = &f.district {
                filters.push(eq_text("distrito", district));
            }
            if f.only_alerts {
                filters.push(stock_alert());
            }
        }
        KpiQuery::Coverage(f) => {
            if let Some(district) = &f.district {
                filters.push(eq_text("distrito", district));
            }
        }
        KpiQuery::TopStockouts => {}
    }

    SelectQuery {
        select,
        from: TableRef::named(BASE),
        filters,
        ..SelectQuery::default()
    }
}

/// Deterministic order of each KPI, tie-breaks down to the grouping key.
pub(super) fn ordering(kind: KpiKind) -> Vec<OrderItem> {
    match kind {
        KpiKind::FillRate => vec![OrderItem::asc("dia"), OrderItem::asc("distrito")],
        KpiKind::Stockout => vec![
            OrderItem::desc("alerta"),
            OrderItem::asc("distrito"),
            OrderItem::asc("id_producto"),
        ],
        KpiKind::Coverage => vec![
            OrderItem::asc("dias_cobertura").nulls_first(),
            OrderItem::asc("id_sucursal"),
            OrderItem::asc("id_producto"),
        ],
        KpiKind::TopStockouts => vec![
            OrderItem::desc("dias_en_alerta"),
            OrderItem::asc("codigo_atc"),
            OrderItem::asc("nombre"),
        ],
    }
}
