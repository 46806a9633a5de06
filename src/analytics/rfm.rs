//! RFM Engine - Recency / Frequency / Monetary scoring and segmentation
//!
//! Scores are recomputed on every call from the current warehouse contents.
//! Each dimension is binned into quartiles over the current customer
//! population, with 4 always meaning "best". Segments depend on R and F only;
//! the monetary score is reported but deliberately not used for classification.

use crate::error::Result;
use crate::ingestion::parse_date;
use crate::warehouse::frame::{f64_values, i64_values, string_values};
use crate::warehouse::QueryGateway;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "Champions")]
    Champions,
    #[serde(rename = "Loyal")]
    Loyal,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Hibernating")]
    Hibernating,
    #[serde(rename = "Potential/Other")]
    PotentialOther,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::Champions,
        Segment::Loyal,
        Segment::AtRisk,
        Segment::Hibernating,
        Segment::PotentialOther,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::Loyal => "Loyal",
            Segment::AtRisk => "At Risk",
            Segment::Hibernating => "Hibernating",
            Segment::PotentialOther => "Potential/Other",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

type SegmentRule = (fn(u8, u8) -> bool, Segment);

fn is_champion(r: u8, f: u8) -> bool {
    r >= 4 && f >= 4
}

fn is_loyal(r: u8, f: u8) -> bool {
    r >= 3 && f >= 3
}

fn is_at_risk(r: u8, f: u8) -> bool {
    r <= 2 && f >= 3
}

fn is_hibernating(r: u8, f: u8) -> bool {
    r <= 2 && f <= 2
}

/// Evaluated top to bottom; the first match wins.
const SEGMENT_RULES: [SegmentRule; 4] = [
    (is_champion, Segment::Champions),
    (is_loyal, Segment::Loyal),
    (is_at_risk, Segment::AtRisk),
    (is_hibernating, Segment::Hibernating),
];

/// Classify a customer from its recency and frequency scores.
pub fn classify(r: u8, f: u8) -> Segment {
    SEGMENT_RULES
        .iter()
        .find(|(matches, _)| matches(r, f))
        .map(|(_, segment)| *segment)
        .unwrap_or(Segment::PotentialOther)
}

/// Per-customer aggregates the scores are derived from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerActivity {
    pub customer_id: String,
    pub customer_name: String,
    pub last_order_date: NaiveDate,
    /// Distinct orders
    pub frequency: i64,
    /// Sum of sales
    pub monetary: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RfmRecord {
    pub customer_id: String,
    pub customer_name: String,
    /// Days between the customer's last order and the latest order in the dataset
    pub recency: i64,
    pub frequency: i64,
    pub monetary: f64,
    pub r: u8,
    pub f: u8,
    pub m: u8,
    /// Concatenated scores, e.g. "432"
    pub rfm_score: String,
    pub segment: Segment,
}

/// Quantile edges collapsed; binning on raw values is impossible.
#[derive(Debug)]
struct DegenerateDistribution;

/// Linear-interpolated quantile over sorted data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Assign each value to quartile bucket 1..=4 (1 = lowest values).
/// Buckets are right-closed, the first one also holds the minimum.
fn quartile_cut(values: &[f64]) -> std::result::Result<Vec<u8>, DegenerateDistribution> {
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let edges: Vec<f64> = [0.0, 0.25, 0.5, 0.75, 1.0]
        .iter()
        .map(|&q| quantile(&sorted, q))
        .collect();

    if edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(DegenerateDistribution);
    }

    Ok(values
        .iter()
        .map(|v| (1..=4).find(|&k| *v <= edges[k]).unwrap_or(4) as u8)
        .collect())
}

/// 1-based ranks; ties keep input order.
fn first_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    for (pos, idx) in order.into_iter().enumerate() {
        ranks[idx] = (pos + 1) as f64;
    }
    ranks
}

/// Quartile buckets that never fail: repeated edges fall back to binning the
/// stable ranks, and a single-member population lands in bucket 1.
pub fn quartile_buckets(values: &[f64]) -> Vec<u8> {
    match quartile_cut(values) {
        Ok(buckets) => buckets,
        Err(DegenerateDistribution) => {
            debug!("Non-unique quartile edges over {} values, binning by rank", values.len());
            quartile_cut(&first_ranks(values)).unwrap_or_else(|_| vec![1; values.len()])
        }
    }
}

/// Score and segment every customer relative to `reference` ("today").
pub fn score_customers(reference: NaiveDate, activity: &[CustomerActivity]) -> Vec<RfmRecord> {
    let recency: Vec<i64> = activity
        .iter()
        .map(|a| (reference - a.last_order_date).num_days())
        .collect();

    let recency_values: Vec<f64> = recency.iter().map(|&d| d as f64).collect();
    let frequency_values: Vec<f64> = activity.iter().map(|a| a.frequency as f64).collect();
    let monetary_values: Vec<f64> = activity.iter().map(|a| a.monetary).collect();

    let r_buckets = quartile_buckets(&recency_values);
    let f_buckets = quartile_buckets(&frequency_values);
    let m_buckets = quartile_buckets(&monetary_values);

    activity
        .iter()
        .enumerate()
        .map(|(i, a)| {
            // Fewer days since the last order is better.
            let r = 5 - r_buckets[i];
            let f = f_buckets[i];
            let m = m_buckets[i];
            RfmRecord {
                customer_id: a.customer_id.clone(),
                customer_name: a.customer_name.clone(),
                recency: recency[i],
                frequency: a.frequency,
                monetary: a.monetary,
                r,
                f,
                m,
                rfm_score: format!("{}{}{}", r, f, m),
                segment: classify(r, f),
            }
        })
        .collect()
}

/// Per-segment rollup of an RFM table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub customers: usize,
    pub total_revenue: f64,
    pub avg_recency: f64,
    pub avg_frequency: f64,
    /// Share of all customers' revenue, in percent
    pub revenue_pct: f64,
}

pub fn summarize_segments(records: &[RfmRecord]) -> Vec<SegmentSummary> {
    let grand_total: f64 = records.iter().map(|r| r.monetary).sum();

    Segment::ALL
        .iter()
        .filter_map(|&segment| {
            let members: Vec<&RfmRecord> = records.iter().filter(|r| r.segment == segment).collect();
            if members.is_empty() {
                return None;
            }
            let n = members.len() as f64;
            let total_revenue: f64 = members.iter().map(|r| r.monetary).sum();
            Some(SegmentSummary {
                segment,
                customers: members.len(),
                total_revenue,
                avg_recency: members.iter().map(|r| r.recency as f64).sum::<f64>() / n,
                avg_frequency: members.iter().map(|r| r.frequency as f64).sum::<f64>() / n,
                revenue_pct: if grand_total != 0.0 {
                    total_revenue / grand_total * 100.0
                } else {
                    0.0
                },
            })
        })
        .collect()
}

/// Tabular form of an RFM result.
pub fn rfm_frame(records: &[RfmRecord]) -> Result<DataFrame> {
    let df = df!(
        "customer_id" => records.iter().map(|r| r.customer_id.clone()).collect::<Vec<_>>(),
        "customer_name" => records.iter().map(|r| r.customer_name.clone()).collect::<Vec<_>>(),
        "recency" => records.iter().map(|r| r.recency).collect::<Vec<_>>(),
        "frequency" => records.iter().map(|r| r.frequency).collect::<Vec<_>>(),
        "monetary" => records.iter().map(|r| r.monetary).collect::<Vec<_>>(),
        "R" => records.iter().map(|r| r.r as i32).collect::<Vec<_>>(),
        "F" => records.iter().map(|r| r.f as i32).collect::<Vec<_>>(),
        "M" => records.iter().map(|r| r.m as i32).collect::<Vec<_>>(),
        "rfm_score" => records.iter().map(|r| r.rfm_score.clone()).collect::<Vec<_>>(),
        "segment" => records.iter().map(|r| r.segment.label()).collect::<Vec<_>>()
    )?;
    Ok(df)
}

/// Tabular form of a segment summary.
pub fn segment_frame(summary: &[SegmentSummary]) -> Result<DataFrame> {
    let df = df!(
        "segment" => summary.iter().map(|s| s.segment.label()).collect::<Vec<_>>(),
        "customers" => summary.iter().map(|s| s.customers as i64).collect::<Vec<_>>(),
        "total_revenue" => summary.iter().map(|s| s.total_revenue).collect::<Vec<_>>(),
        "avg_recency" => summary.iter().map(|s| s.avg_recency).collect::<Vec<_>>(),
        "avg_frequency" => summary.iter().map(|s| s.avg_frequency).collect::<Vec<_>>(),
        "revenue_pct" => summary.iter().map(|s| s.revenue_pct).collect::<Vec<_>>()
    )?;
    Ok(df)
}

const ACTIVITY_SQL: &str = r#"
SELECT
    c.customer_id AS customer_id,
    c.customer_name AS customer_name,
    MAX(f.order_date) AS last_order_date,
    COUNT(DISTINCT f.order_id) AS frequency,
    SUM(f.sales) AS monetary
FROM fact_orders f
JOIN dim_customers c ON f.customer_id = c.customer_id
GROUP BY c.customer_id, c.customer_name
ORDER BY c.customer_id
"#;

/// RFM Engine over a warehouse
pub struct RfmEngine<'a> {
    gateway: &'a QueryGateway,
}

impl<'a> RfmEngine<'a> {
    pub fn new(gateway: &'a QueryGateway) -> Self {
        Self { gateway }
    }

    /// Latest order date in the warehouse, used as "now".
    pub fn reference_date(&self) -> Result<Option<NaiveDate>> {
        let df = self
            .gateway
            .query("SELECT MAX(order_date) AS max_date FROM fact_orders", &[])?;
        Ok(string_values(&df, "max_date")?
            .first()
            .and_then(|d| parse_date(d)))
    }

    pub fn customer_activity(&self) -> Result<Vec<CustomerActivity>> {
        let df = self.gateway.query(ACTIVITY_SQL, &[])?;

        let ids = string_values(&df, "customer_id")?;
        let names = string_values(&df, "customer_name")?;
        let last_dates = string_values(&df, "last_order_date")?;
        let frequency = i64_values(&df, "frequency")?;
        let monetary = f64_values(&df, "monetary")?;

        let mut activity = Vec::with_capacity(ids.len());
        for i in 0..ids.len() {
            let Some(last_order_date) = parse_date(&last_dates[i]) else {
                warn!("Skipping customer {} with unreadable last order date", ids[i]);
                continue;
            };
            activity.push(CustomerActivity {
                customer_id: ids[i].clone(),
                customer_name: names[i].clone(),
                last_order_date,
                frequency: frequency[i],
                monetary: monetary[i],
            });
        }
        Ok(activity)
    }

    /// Full RFM table, one row per customer.
    pub fn compute(&self) -> Result<Vec<RfmRecord>> {
        let Some(reference) = self.reference_date()? else {
            warn!("⚠️ No orders in warehouse, RFM table is empty");
            return Ok(Vec::new());
        };

        let activity = self.customer_activity()?;
        let records = score_customers(reference, &activity);
        info!("👥 Scored {} customers (reference date {})", records.len(), reference);
        Ok(records)
    }

    pub fn segment_summary(&self) -> Result<Vec<SegmentSummary>> {
        Ok(summarize_segments(&self.compute()?))
    }
}
