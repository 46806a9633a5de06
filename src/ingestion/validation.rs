//! Record validation - date parsing with an explicit reject count

use crate::ingestion::csv_source::RawRecord;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

const DATE_FORMATS: [&str; 3] = ["%d-%m-%Y", "%Y-%m-%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%d-%m-%Y %H:%M"];

/// A record whose order and ship dates both parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidRecord {
    pub raw: RawRecord,
    pub order_date: NaiveDate,
    pub ship_date: NaiveDate,
}

/// Output of [`validate_records`]: surviving records plus how many were dropped.
#[derive(Clone, Debug, Default)]
pub struct ValidatedSet {
    pub records: Vec<ValidRecord>,
    pub rejected: usize,
}

/// Parse a calendar date in any of the accepted source formats.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Drop every record whose order date or ship date fails to parse.
/// Rows are dropped, never repaired.
pub fn validate_records(records: Vec<RawRecord>) -> ValidatedSet {
    let mut set = ValidatedSet::default();

    for raw in records {
        match (parse_date(&raw.order_date), parse_date(&raw.ship_date)) {
            (Some(order_date), Some(ship_date)) => set.records.push(ValidRecord {
                raw,
                order_date,
                ship_date,
            }),
            _ => {
                debug!(
                    "Rejecting row {} (order date {:?}, ship date {:?})",
                    raw.row_id, raw.order_date, raw.ship_date
                );
                set.rejected += 1;
            }
        }
    }

    if set.rejected > 0 {
        warn!("⚠️ Dropped {} rows with unparseable dates", set.rejected);
    }

    set
}
