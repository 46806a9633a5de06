//! Query Gateway - read-only access to the warehouse
//!
//! Every query opens its own read-only connection, so a concurrent rebuild
//! (which swaps the file) never exposes half-written tables.

use crate::config::DashboardConfig;
use crate::error::{RetailError, Result};
use crate::warehouse::cache::QueryCache;
use crate::warehouse::filter::{DashboardFilter, FilterOptions, FILTERED_SOURCE};
use crate::warehouse::frame::{f64_values, i64_values, query_to_frame, scalar_f64, string_values};
use polars::prelude::DataFrame;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Headline KPIs for the executive overview
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_sales: f64,
    pub total_profit: f64,
    /// profit / sales × 100, zero when sales is zero
    pub profit_margin: f64,
    pub total_orders: i64,
    pub total_customers: i64,
    /// sales / distinct orders, zero when there are no orders
    pub avg_order_value: f64,
}

impl Kpis {
    fn from_totals(total_sales: f64, total_profit: f64, total_orders: i64, total_customers: i64) -> Self {
        let profit_margin = if total_sales != 0.0 {
            total_profit / total_sales * 100.0
        } else {
            0.0
        };
        let avg_order_value = if total_orders > 0 {
            total_sales / total_orders as f64
        } else {
            0.0
        };

        Self {
            total_sales,
            total_profit,
            profit_margin,
            total_orders,
            total_customers,
            avg_order_value,
        }
    }
}

#[derive(Debug)]
pub struct QueryGateway {
    path: PathBuf,
    cache: QueryCache<DataFrame>,
}

impl QueryGateway {
    /// Attach to an existing warehouse file.
    pub fn open(path: impl AsRef<Path>, cache: QueryCache<DataFrame>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(RetailError::StorageNotFound { path });
        }
        Ok(Self { path, cache })
    }

    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        Self::open(&config.warehouse_path, QueryCache::new(config.cache_ttl))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache(&self) -> &QueryCache<DataFrame> {
        &self.cache
    }

    /// Execute a parameterized read query, consulting the cache first.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<DataFrame> {
        let key = format!("{}|{:?}", sql, params);
        self.cache.get_or_compute(&key, || self.execute(sql, params))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<DataFrame> {
        if !self.path.exists() {
            return Err(RetailError::StorageNotFound {
                path: self.path.clone(),
            });
        }

        let start = Instant::now();
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut stmt = conn.prepare(sql)?;
        let df = query_to_frame(&mut stmt, params_from_iter(params.iter()))?;

        debug!(
            "🔍 Query returned {} rows in {}ms",
            df.height(),
            start.elapsed().as_millis()
        );
        Ok(df)
    }

    /// Six headline KPIs over the whole warehouse.
    pub fn kpis(&self) -> Result<Kpis> {
        self.kpis_filtered(&DashboardFilter::all())
    }

    /// Headline KPIs restricted to `filter`.
    pub fn kpis_filtered(&self, filter: &DashboardFilter) -> Result<Kpis> {
        let (where_clause, params) = filter.where_clause();
        let source = if filter.is_unrestricted() {
            "fact_orders f"
        } else {
            FILTERED_SOURCE
        };
        let sql = format!(
            r#"SELECT
                SUM(f.sales) AS total_sales,
                SUM(f.profit) AS total_profit,
                COUNT(DISTINCT f.order_id) AS total_orders,
                COUNT(DISTINCT f.customer_id) AS total_customers
            FROM {} {}"#,
            source, where_clause
        );

        let df = self.query(&sql, &params)?;
        let total_orders = i64_values(&df, "total_orders")?.first().copied().unwrap_or(0);
        if total_orders == 0 {
            warn!("⚠️ KPI computation over zero rows, returning zeroed KPIs");
        }

        Ok(Kpis::from_totals(
            scalar_f64(&df, "total_sales")?.unwrap_or(0.0),
            scalar_f64(&df, "total_profit")?.unwrap_or(0.0),
            total_orders,
            i64_values(&df, "total_customers")?.first().copied().unwrap_or(0),
        ))
    }

    /// Distinct years, regions and customer segments present in the warehouse.
    pub fn filter_options(&self) -> Result<FilterOptions> {
        let years = self.query(
            "SELECT DISTINCT CAST(strftime('%Y', order_date) AS INTEGER) AS year FROM fact_orders ORDER BY year",
            &[],
        )?;
        let regions = self.query("SELECT DISTINCT region FROM dim_locations ORDER BY region", &[])?;
        let segments = self.query("SELECT DISTINCT segment FROM dim_customers ORDER BY segment", &[])?;

        Ok(FilterOptions {
            years: f64_values(&years, "year")?.into_iter().map(|y| y as i32).collect(),
            regions: string_values(&regions, "region")?,
            segments: string_values(&segments, "segment")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_and_order_value_guards() {
        let kpis = Kpis::from_totals(0.0, -5.0, 0, 0);
        assert_eq!(kpis.profit_margin, 0.0);
        assert_eq!(kpis.avg_order_value, 0.0);

        let kpis = Kpis::from_totals(1000.0, 150.0, 4, 3);
        assert!((kpis.profit_margin - 15.0).abs() < 1e-9);
        assert!((kpis.avg_order_value - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_open_missing_warehouse() {
        let result = QueryGateway::open("/no/such/warehouse.db", QueryCache::disabled());
        assert!(matches!(result, Err(RetailError::StorageNotFound { .. })));
    }
}
