//! Star Schema Builder - Reshapes validated records into dimensions and facts
//!
//! Three dimension tables (customers, products, locations) and one fact table.
//! Dimensions keep first-occurrence order; the location dimension gets a
//! synthetic key numbered from 1 in that order.

use crate::ingestion::validation::ValidRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDim {
    pub customer_id: String,
    pub customer_name: String,
    pub segment: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDim {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub sub_category: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    pub city: String,
    pub state: String,
    pub country: String,
    pub region: String,
    pub market: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDim {
    /// Surrogate key, 1-based, assigned in first-appearance order
    pub location_id: i64,
    #[serde(flatten)]
    pub key: LocationKey,
}

/// One row per surviving transaction line. Missing measures load as NULL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderFact {
    pub row_id: i64,
    pub order_id: String,
    pub order_date: NaiveDate,
    pub ship_date: NaiveDate,
    pub ship_mode: String,
    pub customer_id: String,
    pub product_id: String,
    pub location_id: i64,
    pub sales: Option<f64>,
    pub quantity: Option<i64>,
    pub discount: Option<f64>,
    pub profit: Option<f64>,
    pub shipping_cost: Option<f64>,
    pub order_priority: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StarSchema {
    pub customers: Vec<CustomerDim>,
    pub products: Vec<ProductDim>,
    pub locations: Vec<LocationDim>,
    pub facts: Vec<OrderFact>,
}

impl StarSchema {
    /// Transform validated records into the star schema.
    pub fn build(records: &[ValidRecord]) -> Self {
        info!("🔄 Transforming {} records into dimensional schema", records.len());

        let mut customers = Vec::new();
        let mut seen_customers = HashSet::new();
        let mut products = Vec::new();
        let mut seen_products = HashSet::new();
        let mut locations: Vec<LocationDim> = Vec::new();
        let mut location_ids: HashMap<LocationKey, i64> = HashMap::new();
        let mut facts = Vec::with_capacity(records.len());

        for record in records {
            let raw = &record.raw;
            // Source padding would otherwise split one product into several rows.
            let product_id = raw.product_id.trim().to_string();

            if seen_customers.insert(raw.customer_id.clone()) {
                customers.push(CustomerDim {
                    customer_id: raw.customer_id.clone(),
                    customer_name: raw.customer_name.clone(),
                    segment: raw.segment.clone(),
                });
            }

            if seen_products.insert(product_id.clone()) {
                products.push(ProductDim {
                    product_id: product_id.clone(),
                    product_name: raw.product_name.clone(),
                    category: raw.category.clone(),
                    sub_category: raw.sub_category.clone(),
                });
            }

            let key = LocationKey {
                city: raw.city.clone(),
                state: raw.state.clone(),
                country: raw.country.clone(),
                region: raw.region.clone(),
                market: raw.market.clone(),
            };
            let location_id = match location_ids.get(&key) {
                Some(&id) => id,
                None => {
                    let id = locations.len() as i64 + 1;
                    location_ids.insert(key.clone(), id);
                    locations.push(LocationDim { location_id: id, key });
                    id
                }
            };

            facts.push(OrderFact {
                row_id: raw.row_id,
                order_id: raw.order_id.clone(),
                order_date: record.order_date,
                ship_date: record.ship_date,
                ship_mode: raw.ship_mode.clone(),
                customer_id: raw.customer_id.clone(),
                product_id,
                location_id,
                sales: raw.sales,
                quantity: raw.quantity,
                discount: raw.discount,
                profit: raw.profit,
                shipping_cost: raw.shipping_cost,
                order_priority: raw.order_priority.clone(),
            });
        }

        Self {
            customers,
            products,
            locations,
            facts,
        }
    }

    /// Facts whose foreign keys do not resolve to exactly one dimension row.
    pub fn orphan_facts(&self) -> Vec<i64> {
        let customers: HashSet<&str> = self.customers.iter().map(|c| c.customer_id.as_str()).collect();
        let products: HashSet<&str> = self.products.iter().map(|p| p.product_id.as_str()).collect();
        let locations: HashSet<i64> = self.locations.iter().map(|l| l.location_id).collect();

        self.facts
            .iter()
            .filter(|f| {
                !customers.contains(f.customer_id.as_str())
                    || !products.contains(f.product_id.as_str())
                    || !locations.contains(&f.location_id)
            })
            .map(|f| f.row_id)
            .collect()
    }
}
