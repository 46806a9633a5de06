//! Warehouse Loader - Persists a star schema into SQLite
//!
//! The rebuild is written into a sibling `.building` file inside a single
//! transaction and then renamed over the live warehouse, so readers only ever
//! see the old or the new file.

use crate::error::Result;
use crate::ingestion::star_schema::StarSchema;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DIM_CUSTOMERS: &str = "dim_customers";
pub const DIM_PRODUCTS: &str = "dim_products";
pub const DIM_LOCATIONS: &str = "dim_locations";
pub const FACT_ORDERS: &str = "fact_orders";

pub const WAREHOUSE_TABLES: [&str; 4] = [DIM_CUSTOMERS, DIM_PRODUCTS, DIM_LOCATIONS, FACT_ORDERS];

const SCHEMA_DDL: &str = r#"
CREATE TABLE dim_customers (
    customer_id TEXT PRIMARY KEY,
    customer_name TEXT NOT NULL,
    segment TEXT NOT NULL
);
CREATE TABLE dim_products (
    product_id TEXT PRIMARY KEY,
    product_name TEXT NOT NULL,
    category TEXT NOT NULL,
    sub_category TEXT NOT NULL
);
CREATE TABLE dim_locations (
    location_id INTEGER PRIMARY KEY,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    country TEXT NOT NULL,
    region TEXT NOT NULL,
    market TEXT NOT NULL
);
CREATE TABLE fact_orders (
    row_id INTEGER NOT NULL,
    order_id TEXT NOT NULL,
    order_date TEXT NOT NULL,
    ship_date TEXT NOT NULL,
    ship_mode TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    location_id INTEGER NOT NULL,
    sales REAL,
    quantity INTEGER,
    discount REAL,
    profit REAL,
    shipping_cost REAL,
    order_priority TEXT NOT NULL
);
"#;

const INDEX_DDL: &str = r#"
CREATE INDEX idx_fact_date ON fact_orders(order_date);
CREATE INDEX idx_fact_cust ON fact_orders(customer_id);
CREATE INDEX idx_fact_prod ON fact_orders(product_id);
CREATE INDEX idx_fact_loc ON fact_orders(location_id);
"#;

/// Date format used for every date column in the warehouse.
pub const STORED_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct WarehouseLoader {
    target: PathBuf,
}

impl WarehouseLoader {
    pub fn new(target: impl AsRef<Path>) -> Self {
        Self {
            target: target.as_ref().to_path_buf(),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "warehouse.db".into());
        name.push(".building");
        self.target.with_file_name(name)
    }

    /// Write `schema` and swap it in as the live warehouse.
    /// Returns the row count of each table after the load.
    pub fn load(&self, schema: &StarSchema) -> Result<BTreeMap<String, i64>> {
        if let Some(parent) = self.target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let staging = self.staging_path();
        if staging.exists() {
            debug!("Removing stale staging file {:?}", staging);
            std::fs::remove_file(&staging)?;
        }

        info!("📥 Loading data into {:?}", staging);
        let counts = match Self::write_all(&staging, schema) {
            Ok(counts) => counts,
            Err(e) => {
                let _ = std::fs::remove_file(&staging);
                return Err(e);
            }
        };

        std::fs::rename(&staging, &self.target)?;
        info!("✅ Warehouse swapped into place at {:?}", self.target);

        Ok(counts)
    }

    fn write_all(path: &Path, schema: &StarSchema) -> Result<BTreeMap<String, i64>> {
        let mut conn = Connection::open(path)?;
        let tx = conn.transaction()?;

        tx.execute_batch(SCHEMA_DDL)?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO dim_customers (customer_id, customer_name, segment) VALUES (?1, ?2, ?3)",
            )?;
            for c in &schema.customers {
                stmt.execute(params![c.customer_id, c.customer_name, c.segment])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO dim_products (product_id, product_name, category, sub_category) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for p in &schema.products {
                stmt.execute(params![p.product_id, p.product_name, p.category, p.sub_category])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO dim_locations (location_id, city, state, country, region, market) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for l in &schema.locations {
                stmt.execute(params![
                    l.location_id,
                    l.key.city,
                    l.key.state,
                    l.key.country,
                    l.key.region,
                    l.key.market
                ])?;
            }

            let mut stmt = tx.prepare(
                r#"INSERT INTO fact_orders (
                    row_id, order_id, order_date, ship_date, ship_mode,
                    customer_id, product_id, location_id,
                    sales, quantity, discount, profit, shipping_cost, order_priority
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
            )?;
            for f in &schema.facts {
                stmt.execute(params![
                    f.row_id,
                    f.order_id,
                    f.order_date.format(STORED_DATE_FORMAT).to_string(),
                    f.ship_date.format(STORED_DATE_FORMAT).to_string(),
                    f.ship_mode,
                    f.customer_id,
                    f.product_id,
                    f.location_id,
                    f.sales,
                    f.quantity,
                    f.discount,
                    f.profit,
                    f.shipping_cost,
                    f.order_priority
                ])?;
            }
        }

        info!("🗂️ Creating indices");
        tx.execute_batch(INDEX_DDL)?;

        let mut counts = BTreeMap::new();
        for table in WAREHOUSE_TABLES {
            let count: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            info!("{}: {} rows", table, count);
            counts.insert(table.to_string(), count);
        }

        tx.commit()?;
        conn.close().map_err(|(_, e)| e)?;

        Ok(counts)
    }
}
