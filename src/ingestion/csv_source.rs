//! CSV Source - Reads the flat transactional dataset into raw records

use crate::error::{RetailError, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One transaction line exactly as it appears in the source file.
/// Dates stay textual until validation; a blank or unreadable measure is `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub row_id: i64,
    pub order_id: String,
    pub order_date: String,
    pub ship_date: String,
    pub ship_mode: String,
    pub customer_id: String,
    pub customer_name: String,
    pub segment: String,
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub sub_category: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub region: String,
    pub market: String,
    pub sales: Option<f64>,
    pub quantity: Option<i64>,
    pub discount: Option<f64>,
    pub profit: Option<f64>,
    pub shipping_cost: Option<f64>,
    pub order_priority: String,
}

impl RawRecord {
    fn has_missing_measure(&self) -> bool {
        self.sales.is_none()
            || self.quantity.is_none()
            || self.discount.is_none()
            || self.profit.is_none()
            || self.shipping_cost.is_none()
    }
}

/// Header names the source must carry. Other columns are ignored.
pub const REQUIRED_COLUMNS: [&str; 23] = [
    "Row ID",
    "Order ID",
    "Order Date",
    "Ship Date",
    "Ship Mode",
    "Customer ID",
    "Customer Name",
    "Segment",
    "Product ID",
    "Product Name",
    "Category",
    "Sub-Category",
    "City",
    "State",
    "Country",
    "Region",
    "Market",
    "Sales",
    "Quantity",
    "Discount",
    "Profit",
    "Shipping Cost",
    "Order Priority",
];

/// CSV Source - wraps a dataset on disk
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record from the file.
    ///
    /// A missing file is reported as [`RetailError::SourceNotFound`].
    pub fn read_records(&self) -> Result<Vec<RawRecord>> {
        if !self.path.exists() {
            return Err(RetailError::SourceNotFound {
                path: self.path.clone(),
            });
        }

        info!("📂 Extracting data from {:?}", self.path);
        let bytes = std::fs::read(&self.path)?;
        let text = decode_text(bytes);
        parse_records(&text)
    }
}

/// Decode as UTF-8 when valid, otherwise treat every byte as ISO-8859-1.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            debug!("Source is not valid UTF-8, decoding as latin1");
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    }
}

/// Parse CSV text (with header row) into raw records.
pub fn parse_records(csv_text: &str) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: HashMap<String, usize> = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), idx))
        .collect();

    for column in REQUIRED_COLUMNS {
        if !headers.contains_key(column) {
            return Err(RetailError::MissingColumn(column.to_string()));
        }
    }

    let mut out = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let cells = RecordCells {
            record: &record,
            headers: &headers,
            line,
        };

        out.push(RawRecord {
            row_id: cells.number("Row ID")?,
            order_id: cells.text("Order ID"),
            order_date: cells.text("Order Date"),
            ship_date: cells.text("Ship Date"),
            ship_mode: cells.text("Ship Mode"),
            customer_id: cells.text("Customer ID"),
            customer_name: cells.text("Customer Name"),
            segment: cells.text("Segment"),
            product_id: cells.raw("Product ID").to_string(),
            product_name: cells.text("Product Name"),
            category: cells.text("Category"),
            sub_category: cells.text("Sub-Category"),
            city: cells.text("City"),
            state: cells.text("State"),
            country: cells.text("Country"),
            region: cells.text("Region"),
            market: cells.text("Market"),
            sales: cells.measure("Sales"),
            quantity: cells.measure("Quantity"),
            discount: cells.measure("Discount"),
            profit: cells.measure("Profit"),
            shipping_cost: cells.measure("Shipping Cost"),
            order_priority: cells.text("Order Priority"),
        });
    }

    let incomplete = out.iter().filter(|r| r.has_missing_measure()).count();
    if incomplete > 0 {
        warn!("⚠️ {} records carry blank or unreadable measures, stored as NULL", incomplete);
    }
    debug!("Parsed {} raw records", out.len());
    Ok(out)
}

struct RecordCells<'a> {
    record: &'a csv::StringRecord,
    headers: &'a HashMap<String, usize>,
    line: u64,
}

impl<'a> RecordCells<'a> {
    fn raw(&self, column: &str) -> &'a str {
        self.headers
            .get(column)
            .and_then(|&idx| self.record.get(idx))
            .unwrap_or("")
    }

    fn text(&self, column: &str) -> String {
        self.raw(column).to_string()
    }

    fn parse<T: std::str::FromStr>(&self, column: &str) -> Option<T> {
        let cleaned: String = self.raw(column).trim().chars().filter(|c| *c != ',').collect();
        cleaned.parse::<T>().ok()
    }

    /// Structurally required numeric cell.
    fn number<T: std::str::FromStr>(&self, column: &str) -> Result<T> {
        self.parse(column).ok_or_else(|| RetailError::MalformedRecord {
            line: self.line,
            column: column.to_string(),
            value: self.raw(column).to_string(),
        })
    }

    /// Measure cell; blank or unreadable values are missing, not fatal.
    fn measure<T: std::str::FromStr>(&self, column: &str) -> Option<T> {
        let value = self.parse(column);
        if value.is_none() && !self.raw(column).trim().is_empty() {
            debug!("Unreadable {} {:?} at line {}", column, self.raw(column), self.line);
        }
        value
    }
}
