//! Insight Generator - rule-based business findings over order lines
//!
//! Pure: the same rows always produce the same findings in the same order.

use crate::error::Result;
use crate::warehouse::filter::{DashboardFilter, FILTERED_SOURCE};
use crate::warehouse::frame::{f64_values, i64_values, opt_f64_values, string_values};
use crate::warehouse::QueryGateway;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

pub const NO_DATA_MESSAGE: &str = "No data available for the current filters.";

const HEALTHY_MARGIN_PCT: f64 = 15.0;
const HIGH_DISCOUNT: f64 = 0.30;
const LOW_DISCOUNT: f64 = 0.10;

/// One order line as seen by the insight rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsightRow {
    pub category: String,
    pub sub_category: String,
    pub sales: f64,
    pub quantity: i64,
    pub profit: f64,
    /// Discount rate in 0..=1, `None` when the source cell was blank
    pub discount: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Finding {
    NoData,
    HealthyMargin { margin_pct: f64 },
    ModerateMargin { margin_pct: f64 },
    LossWarning { margin_pct: f64 },
    CategoryPerformance { top: String, bottom: String },
    HighDiscount { avg_discount: f64 },
    HealthyPricing { avg_discount: f64 },
    VolumeValueMismatch { sub_category: String },
    TopVolumeDriver { sub_category: String },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::NoData => f.write_str(NO_DATA_MESSAGE),
            Finding::HealthyMargin { margin_pct } => write!(
                f,
                "Healthy Profit Margin: The overall profit margin is strong at {:.1}% for the selected data.",
                margin_pct
            ),
            Finding::ModerateMargin { margin_pct } => write!(
                f,
                "Moderate Profitability: The profit margin is at {:.1}%. Consider reviewing discount strategies.",
                margin_pct
            ),
            Finding::LossWarning { margin_pct } => write!(
                f,
                "Loss Warning: The selected segment is operating at a net loss (Margin: {:.1}%). Investigate highest discounting or shipping costs.",
                margin_pct
            ),
            Finding::CategoryPerformance { top, bottom } => write!(
                f,
                "Category Performance: {} is the most profitable category, whereas {} generates the least profit.",
                top, bottom
            ),
            Finding::HighDiscount { avg_discount } => write!(
                f,
                "High Discount Alert: The average discount applied is quite high ({:.0}%). This may be severely impacting absolute profits.",
                avg_discount * 100.0
            ),
            Finding::HealthyPricing { avg_discount } => write!(
                f,
                "Healthy Pricing: Discounts are kept low on average ({:.0}%), preserving profit margins.",
                avg_discount * 100.0
            ),
            Finding::VolumeValueMismatch { sub_category } => write!(
                f,
                "Volume vs Value Mismatch: {} has the highest sales volume but is currently yielding a negative profit. A pricing or cost review is highly recommended.",
                sub_category
            ),
            Finding::TopVolumeDriver { sub_category } => write!(
                f,
                "Top Volume Driver: {} moves the most units, contributing positively to profit.",
                sub_category
            ),
        }
    }
}

/// Evaluate every rule in order and return the findings that fired.
pub fn findings(rows: &[InsightRow]) -> Vec<Finding> {
    if rows.is_empty() {
        warn!("⚠️ Insight generation over zero rows");
        return vec![Finding::NoData];
    }

    let mut out = Vec::new();

    // 1. Overall profitability
    let total_sales: f64 = rows.iter().map(|r| r.sales).sum();
    let total_profit: f64 = rows.iter().map(|r| r.profit).sum();
    if total_sales > 0.0 {
        let margin_pct = total_profit / total_sales * 100.0;
        out.push(if margin_pct > HEALTHY_MARGIN_PCT {
            Finding::HealthyMargin { margin_pct }
        } else if margin_pct > 0.0 {
            Finding::ModerateMargin { margin_pct }
        } else {
            Finding::LossWarning { margin_pct }
        });
    }

    // 2. Most and least profitable category
    let mut category_profit: BTreeMap<&str, f64> = BTreeMap::new();
    for row in rows {
        *category_profit.entry(row.category.as_str()).or_insert(0.0) += row.profit;
    }
    if category_profit.len() > 1 {
        let mut ranked: Vec<(&str, f64)> = category_profit.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        out.push(Finding::CategoryPerformance {
            top: ranked[0].0.to_string(),
            bottom: ranked[ranked.len() - 1].0.to_string(),
        });
    }

    // 3. Discount level over known discounts; the band between the thresholds is silent
    let discounts: Vec<f64> = rows.iter().filter_map(|r| r.discount).collect();
    if !discounts.is_empty() {
        let avg_discount = discounts.iter().sum::<f64>() / discounts.len() as f64;
        if avg_discount > HIGH_DISCOUNT {
            out.push(Finding::HighDiscount { avg_discount });
        } else if avg_discount < LOW_DISCOUNT {
            out.push(Finding::HealthyPricing { avg_discount });
        }
    }

    // 4. Highest-volume sub-category and whether it makes money
    let mut volume: BTreeMap<&str, (i64, f64)> = BTreeMap::new();
    for row in rows {
        let entry = volume.entry(row.sub_category.as_str()).or_insert((0, 0.0));
        entry.0 += row.quantity;
        entry.1 += row.profit;
    }
    let mut top: Option<(&str, i64, f64)> = None;
    for (&name, &(quantity, profit)) in &volume {
        if top.map_or(true, |(_, best, _)| quantity > best) {
            top = Some((name, quantity, profit));
        }
    }
    if let Some((name, _, profit)) = top {
        out.push(if profit < 0.0 {
            Finding::VolumeValueMismatch {
                sub_category: name.to_string(),
            }
        } else {
            Finding::TopVolumeDriver {
                sub_category: name.to_string(),
            }
        });
    }

    out
}

/// Rendered findings, in rule order.
pub fn generate_insights(rows: &[InsightRow]) -> Vec<String> {
    findings(rows).iter().map(|f| f.to_string()).collect()
}

/// Order lines matching `filter`, shaped for the insight rules.
pub fn load_insight_rows(gateway: &QueryGateway, filter: &DashboardFilter) -> Result<Vec<InsightRow>> {
    let (where_clause, params) = filter.where_clause();
    let sql = format!(
        "SELECT p.category AS category, p.sub_category AS sub_category, \
         f.sales AS sales, f.quantity AS quantity, f.profit AS profit, f.discount AS discount \
         FROM {} {} ORDER BY f.row_id",
        FILTERED_SOURCE, where_clause
    );
    let df = gateway.query(&sql, &params)?;

    let categories = string_values(&df, "category")?;
    let sub_categories = string_values(&df, "sub_category")?;
    let sales = f64_values(&df, "sales")?;
    let quantity = i64_values(&df, "quantity")?;
    let profit = f64_values(&df, "profit")?;
    let discount = opt_f64_values(&df, "discount")?;

    Ok((0..df.height())
        .map(|i| InsightRow {
            category: categories[i].clone(),
            sub_category: sub_categories[i].clone(),
            sales: sales[i],
            quantity: quantity[i],
            profit: profit[i],
            discount: discount[i],
        })
        .collect())
}
