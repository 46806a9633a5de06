//! Retail analytics warehouse
//!
//! Flattens a transactional retail dataset into a SQLite star schema and
//! serves dashboard analytics over it: headline KPIs, RFM customer
//! segmentation, rule-based insights, aggregate views and a monthly sales
//! forecast.

pub mod analytics;
pub mod config;
pub mod error;
pub mod forecast;
pub mod ingestion;
pub mod warehouse;

pub use config::DashboardConfig;
pub use error::{Result, RetailError};
pub use forecast::{ForecastAdapter, ForecastResult, SeriesModel};
pub use ingestion::{EtlPipeline, EtlReport};
pub use warehouse::{DashboardFilter, Kpis, QueryCache, QueryGateway};
