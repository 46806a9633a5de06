//! Discount what-if simulator
//!
//! Assumes perfectly inelastic demand: volume stays fixed and every unit of
//! revenue given up or recovered through discounting moves profit one-for-one.

use crate::error::{RetailError, Result};
use crate::warehouse::frame::scalar_f64;
use crate::warehouse::QueryGateway;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountBaseline {
    pub sales: f64,
    pub profit: f64,
    /// Mean discount rate over order lines, 0..1
    pub avg_discount: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountScenario {
    /// Simulated average discount, in percent
    pub discount_pct: f64,
    pub sales: f64,
    pub profit: f64,
    pub margin_pct: f64,
    pub sales_delta: f64,
    pub profit_delta: f64,
    pub margin_delta: f64,
}

fn margin(profit: f64, sales: f64) -> f64 {
    if sales != 0.0 {
        profit / sales * 100.0
    } else {
        0.0
    }
}

impl DiscountBaseline {
    pub fn load(gateway: &QueryGateway) -> Result<Self> {
        let df = gateway.query(
            "SELECT SUM(sales) AS base_sales, SUM(profit) AS base_profit, AVG(discount) AS base_discount FROM fact_orders",
            &[],
        )?;
        Ok(Self {
            sales: scalar_f64(&df, "base_sales")?.unwrap_or(0.0),
            profit: scalar_f64(&df, "base_profit")?.unwrap_or(0.0),
            avg_discount: scalar_f64(&df, "base_discount")?.unwrap_or(0.0),
        })
    }

    pub fn margin_pct(&self) -> f64 {
        margin(self.profit, self.sales)
    }

    /// Re-price the baseline at an average discount of `discount_pct` percent.
    pub fn simulate(&self, discount_pct: f64) -> Result<DiscountScenario> {
        if !(0.0..100.0).contains(&discount_pct) {
            return Err(RetailError::Scenario(format!(
                "discount must be in [0, 100) percent, got {}",
                discount_pct
            )));
        }
        if self.avg_discount >= 1.0 {
            return Err(RetailError::Scenario(
                "baseline is fully discounted; gross sales cannot be recovered".to_string(),
            ));
        }

        let gross_sales = self.sales / (1.0 - self.avg_discount);
        let sales = gross_sales * (1.0 - discount_pct / 100.0);
        let profit = self.profit + (sales - self.sales);
        let margin_pct = margin(profit, sales);

        Ok(DiscountScenario {
            discount_pct,
            sales,
            profit,
            margin_pct,
            sales_delta: sales - self.sales,
            profit_delta: profit - self.profit,
            margin_delta: margin_pct - self.margin_pct(),
        })
    }
}
