//! Dashboard filter - year / region / customer segment selection
//!
//! An empty selection means "everything", matching the sidebar defaults.

use itertools::Itertools;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardFilter {
    pub years: Vec<i32>,
    pub regions: Vec<String>,
    pub segments: Vec<String>,
}

/// Distinct values available for each filter dimension
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub years: Vec<i32>,
    pub regions: Vec<String>,
    pub segments: Vec<String>,
}

impl DashboardFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.years.is_empty() && self.regions.is_empty() && self.segments.is_empty()
    }

    /// Render a `WHERE` clause plus its bound parameters.
    ///
    /// Assumes the query aliases `fact_orders f`, `dim_locations l` and
    /// `dim_customers c`. Returns an empty clause when nothing is restricted.
    pub fn where_clause(&self) -> (String, Vec<Value>) {
        let mut predicates = Vec::new();
        let mut params = Vec::new();

        if !self.years.is_empty() {
            predicates.push(format!(
                "CAST(strftime('%Y', f.order_date) AS INTEGER) IN ({})",
                placeholders(self.years.len())
            ));
            params.extend(self.years.iter().map(|y| Value::Integer(*y as i64)));
        }
        if !self.regions.is_empty() {
            predicates.push(format!("l.region IN ({})", placeholders(self.regions.len())));
            params.extend(self.regions.iter().cloned().map(Value::Text));
        }
        if !self.segments.is_empty() {
            predicates.push(format!("c.segment IN ({})", placeholders(self.segments.len())));
            params.extend(self.segments.iter().cloned().map(Value::Text));
        }

        if predicates.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", predicates.join(" AND ")), params)
        }
    }
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).join(", ")
}

/// Joined fact/dimension source that [`DashboardFilter::where_clause`] applies to.
pub const FILTERED_SOURCE: &str = "fact_orders f \
    JOIN dim_customers c ON f.customer_id = c.customer_id \
    JOIN dim_products p ON f.product_id = p.product_id \
    JOIN dim_locations l ON f.location_id = l.location_id";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_filter_has_no_clause() {
        let (clause, params) = DashboardFilter::all().where_clause();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_clause_binds_every_selected_value() {
        let filter = DashboardFilter {
            years: vec![2013, 2014],
            regions: vec!["Oceania".to_string()],
            segments: vec![],
        };
        let (clause, params) = filter.where_clause();
        assert_eq!(
            clause,
            "WHERE CAST(strftime('%Y', f.order_date) AS INTEGER) IN (?, ?) AND l.region IN (?)"
        );
        assert_eq!(
            params,
            vec![
                Value::Integer(2013),
                Value::Integer(2014),
                Value::Text("Oceania".to_string())
            ]
        );
    }
}
