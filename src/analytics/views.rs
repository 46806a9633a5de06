//! Dashboard aggregates - trend, category, region, market, sub-category,
//! order-level discount impact and shipping operations

use crate::error::Result;
use crate::ingestion::parse_date;
use crate::warehouse::filter::{DashboardFilter, FILTERED_SOURCE};
use crate::warehouse::frame::{f64_values, opt_f64_values, string_values};
use crate::warehouse::QueryGateway;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Orders shipped outside this many days are treated as data-entry errors.
pub const MAX_SHIPPING_DAYS: i64 = 30;

fn filtered_query(
    gateway: &QueryGateway,
    filter: &DashboardFilter,
    select: &str,
    tail: &str,
) -> Result<DataFrame> {
    let (where_clause, params) = filter.where_clause();
    let sql = format!("SELECT {} FROM {} {} {}", select, FILTERED_SOURCE, where_clause, tail);
    gateway.query(&sql, &params)
}

/// Sales per calendar month (`YYYY-MM`), chronological.
pub fn monthly_sales_trend(gateway: &QueryGateway, filter: &DashboardFilter) -> Result<DataFrame> {
    filtered_query(
        gateway,
        filter,
        "strftime('%Y-%m', f.order_date) AS month, SUM(f.sales) AS sales",
        "GROUP BY month ORDER BY month",
    )
}

pub fn sales_by_category_segment(gateway: &QueryGateway, filter: &DashboardFilter) -> Result<DataFrame> {
    filtered_query(
        gateway,
        filter,
        "p.category AS category, c.segment AS segment, SUM(f.sales) AS sales",
        "GROUP BY p.category, c.segment ORDER BY p.category, c.segment",
    )
}

/// Profit per region, least profitable first.
pub fn profit_by_region(gateway: &QueryGateway, filter: &DashboardFilter) -> Result<DataFrame> {
    filtered_query(
        gateway,
        filter,
        "l.region AS region, SUM(f.profit) AS profit",
        "GROUP BY l.region ORDER BY profit ASC, l.region",
    )
}

pub fn sales_by_market(gateway: &QueryGateway, filter: &DashboardFilter) -> Result<DataFrame> {
    filtered_query(
        gateway,
        filter,
        "l.market AS market, SUM(f.sales) AS sales",
        "GROUP BY l.market ORDER BY sales DESC, l.market",
    )
}

/// Sales, profit and margin per sub-category, most profitable first.
pub fn subcategory_financials(gateway: &QueryGateway) -> Result<DataFrame> {
    gateway.query(
        r#"SELECT
            p.category AS category,
            p.sub_category AS sub_category,
            SUM(f.sales) AS sales,
            SUM(f.profit) AS profit,
            CASE WHEN SUM(f.sales) = 0 THEN 0.0
                 ELSE SUM(f.profit) / SUM(f.sales) * 100.0 END AS profit_margin
        FROM fact_orders f
        JOIN dim_products p ON f.product_id = p.product_id
        GROUP BY p.category, p.sub_category
        ORDER BY profit DESC"#,
        &[],
    )
}

/// Per order and ship mode: totals and average discount, positive-sales orders only.
pub fn order_discount_impact(gateway: &QueryGateway) -> Result<DataFrame> {
    gateway.query(
        r#"SELECT
            order_id,
            ship_mode,
            SUM(sales) AS total_sales,
            SUM(profit) AS total_profit,
            AVG(discount) AS avg_discount
        FROM fact_orders
        GROUP BY order_id, ship_mode
        HAVING total_sales > 0
        ORDER BY order_id, ship_mode"#,
        &[],
    )
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingSummary {
    pub avg_shipping_days: f64,
    pub total_shipping_cost: f64,
    /// Mean over order lines with a known cost
    pub avg_shipping_cost: f64,
}

pub struct ShippingOperations {
    pub summary: ShippingSummary,
    /// region, avg_shipping_days (fastest first)
    pub by_region: DataFrame,
    /// ship_mode, order_lines, shipping_cost
    pub by_ship_mode: DataFrame,
}

/// Shipping lead times and cost, dropping lines shipped before ordering or
/// more than [`MAX_SHIPPING_DAYS`] later.
pub fn shipping_operations(gateway: &QueryGateway) -> Result<ShippingOperations> {
    let raw = gateway.query(
        r#"SELECT
            f.order_date AS order_date,
            f.ship_date AS ship_date,
            f.ship_mode AS ship_mode,
            f.shipping_cost AS shipping_cost,
            l.region AS region
        FROM fact_orders f
        JOIN dim_locations l ON f.location_id = l.location_id
        ORDER BY f.row_id"#,
        &[],
    )?;

    let order_dates = string_values(&raw, "order_date")?;
    let ship_dates = string_values(&raw, "ship_date")?;
    let shipping_days: Vec<Option<i64>> = order_dates
        .iter()
        .zip(ship_dates.iter())
        .map(|(o, s)| match (parse_date(o), parse_date(s)) {
            (Some(o), Some(s)) => Some((s - o).num_days()),
            _ => None,
        })
        .collect();

    let lines = df!(
        "region" => string_values(&raw, "region")?,
        "ship_mode" => string_values(&raw, "ship_mode")?,
        "shipping_cost" => opt_f64_values(&raw, "shipping_cost")?,
        "shipping_days" => shipping_days
    )?;

    let within = lines
        .lazy()
        .filter(
            col("shipping_days")
                .gt_eq(lit(0i64))
                .and(col("shipping_days").lt_eq(lit(MAX_SHIPPING_DAYS))),
        )
        .collect()?;
    debug!("{} of {} order lines inside the shipping window", within.height(), raw.height());

    let regions = string_values(&within, "region")?;
    let modes = string_values(&within, "ship_mode")?;
    let costs = opt_f64_values(&within, "shipping_cost")?;
    let days = f64_values(&within, "shipping_days")?;

    let n = within.height();
    let known_costs: Vec<f64> = costs.iter().flatten().copied().collect();
    let total_cost: f64 = known_costs.iter().sum();
    let summary = if n == 0 {
        ShippingSummary::default()
    } else {
        ShippingSummary {
            avg_shipping_days: days.iter().sum::<f64>() / n as f64,
            total_shipping_cost: total_cost,
            avg_shipping_cost: if known_costs.is_empty() {
                0.0
            } else {
                total_cost / known_costs.len() as f64
            },
        }
    };

    let mut region_days: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (region, d) in regions.iter().zip(days.iter()) {
        let entry = region_days.entry(region.as_str()).or_insert((0.0, 0));
        entry.0 += d;
        entry.1 += 1;
    }
    let mut region_avg: Vec<(&str, f64)> = region_days
        .into_iter()
        .map(|(region, (sum, count))| (region, sum / count as f64))
        .collect();
    region_avg.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut mode_totals: BTreeMap<&str, (i64, f64)> = BTreeMap::new();
    for (mode, cost) in modes.iter().zip(costs.iter()) {
        let entry = mode_totals.entry(mode.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += cost.unwrap_or(0.0);
    }

    let by_region = df!(
        "region" => region_avg.iter().map(|(r, _)| *r).collect::<Vec<_>>(),
        "avg_shipping_days" => region_avg.iter().map(|(_, d)| *d).collect::<Vec<_>>()
    )?;
    let by_ship_mode = df!(
        "ship_mode" => mode_totals.keys().copied().collect::<Vec<_>>(),
        "order_lines" => mode_totals.values().map(|(c, _)| *c).collect::<Vec<_>>(),
        "shipping_cost" => mode_totals.values().map(|(_, s)| *s).collect::<Vec<_>>()
    )?;

    Ok(ShippingOperations {
        summary,
        by_region,
        by_ship_mode,
    })
}
