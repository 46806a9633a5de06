//! Warehouse access: query gateway, result cache, filters and frame helpers

pub mod cache;
pub mod filter;
pub mod frame;
pub mod gateway;

pub use cache::QueryCache;
pub use filter::{DashboardFilter, FilterOptions};
pub use gateway::{Kpis, QueryGateway};
