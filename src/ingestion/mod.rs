//! Ingestion Module - Rebuilds the warehouse from the flat dataset
//!
//! Extract (CSV) → validate dates → transform into a star schema → load into
//! SQLite with an atomic swap.

pub mod csv_source;
pub mod loader;
pub mod star_schema;
pub mod validation;

pub use csv_source::{CsvSource, RawRecord};
pub use loader::{WarehouseLoader, WAREHOUSE_TABLES};
pub use star_schema::{CustomerDim, LocationDim, LocationKey, OrderFact, ProductDim, StarSchema};
pub use validation::{parse_date, validate_records, ValidRecord, ValidatedSet};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Outcome of one warehouse rebuild
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EtlReport {
    /// Rebuild run ID
    pub run_id: String,

    /// Rows read from the source file
    pub rows_read: usize,

    /// Rows dropped because a date failed to parse
    pub rows_rejected: usize,

    /// Row count per warehouse table after the load
    pub table_counts: BTreeMap<String, i64>,

    /// Live warehouse file
    pub warehouse_path: PathBuf,
}

/// Extract-transform-load pipeline for one source/target pair
pub struct EtlPipeline {
    source: CsvSource,
    loader: WarehouseLoader,
    warehouse_path: PathBuf,
}

impl EtlPipeline {
    pub fn new(source_path: impl AsRef<Path>, warehouse_path: impl AsRef<Path>) -> Self {
        Self {
            source: CsvSource::new(source_path),
            loader: WarehouseLoader::new(&warehouse_path),
            warehouse_path: warehouse_path.as_ref().to_path_buf(),
        }
    }

    /// Run the full rebuild. A missing source aborts before anything is written.
    pub fn run(&self) -> Result<EtlReport> {
        let run_id = Uuid::new_v4().to_string();
        info!("🚀 Starting ETL run {}", run_id);

        let raw = self.source.read_records()?;
        let rows_read = raw.len();

        let validated = validate_records(raw);
        let schema = StarSchema::build(&validated.records);
        let table_counts = self.loader.load(&schema)?;

        info!(
            "🎉 ETL complete: {} rows read, {} rejected, {} facts loaded",
            rows_read,
            validated.rejected,
            schema.facts.len()
        );

        Ok(EtlReport {
            run_id,
            rows_read,
            rows_rejected: validated.rejected,
            table_counts,
            warehouse_path: self.warehouse_path.clone(),
        })
    }
}
