//! Sales forecasting
//!
//! Aggregates the warehouse into a monthly sales series, backtests the model
//! on the most recent months and projects forward with an uncertainty band.
//! Models plug in through [`SeriesModel`].

pub mod smoothing;

use crate::error::{RetailError, Result};
use crate::ingestion::parse_date;
use crate::warehouse::frame::{f64_values, string_values};
use crate::warehouse::QueryGateway;
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use smoothing::{HoltLinear, HoltWintersAdditive, SmoothingModel};

/// Below this many monthly observations no forecast is attempted.
pub const MIN_HISTORY_MONTHS: usize = 12;

/// Trailing months held out for the accuracy backtest.
pub const BACKTEST_HOLDOUT: usize = 3;

const MONTHLY_SALES_SQL: &str = r#"
SELECT strftime('%Y-%m-01', order_date) AS month, SUM(sales) AS sales
FROM fact_orders
GROUP BY month
ORDER BY month
"#;

/// Point forecast with lower/upper bounds, one entry per step ahead
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Projection {
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Projection {
    pub fn with_capacity(horizon: usize) -> Self {
        Self {
            mean: Vec::with_capacity(horizon),
            lower: Vec::with_capacity(horizon),
            upper: Vec::with_capacity(horizon),
        }
    }
}

/// A forecasting model over an evenly spaced series
pub trait SeriesModel: Send + Sync {
    fn name(&self) -> &str;

    /// Fit on `history` and project `horizon` steps past its end.
    fn fit_predict(&self, history: &[f64], horizon: usize) -> Result<Projection>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    /// First day of the month
    pub month: NaiveDate,
    pub sales: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub month: NaiveDate,
    pub yhat: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub history: Vec<MonthlyPoint>,
    /// `None` when the history is too short to model
    pub forecast: Option<Vec<ForecastPoint>>,
    /// Mean absolute percentage error of the backtest, in percent
    pub mape: f64,
}

impl ForecastResult {
    /// Sum of projected sales, 0 without a forecast.
    pub fn projected_total(&self) -> f64 {
        self.forecast
            .as_ref()
            .map(|points| points.iter().map(|p| p.yhat).sum())
            .unwrap_or(0.0)
    }
}

/// Mean absolute percentage error in percent, skipping zero actuals.
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, p)| ((a - p) / a).abs())
        .collect();
    if errors.is_empty() {
        return 0.0;
    }
    errors.iter().sum::<f64>() / errors.len() as f64 * 100.0
}

fn month_after(month: NaiveDate, steps: usize) -> Result<NaiveDate> {
    let steps = u32::try_from(steps)
        .map_err(|_| RetailError::Forecast(format!("horizon {} is too large", steps)))?;
    month
        .checked_add_months(Months::new(steps))
        .ok_or_else(|| RetailError::Forecast(format!("cannot step {} months past {}", steps, month)))
}

/// Monthly total sales over the whole warehouse, chronological.
pub fn monthly_sales(gateway: &QueryGateway) -> Result<Vec<MonthlyPoint>> {
    let df = gateway.query(MONTHLY_SALES_SQL, &[])?;
    let months = string_values(&df, "month")?;
    let sales = f64_values(&df, "sales")?;

    let mut series = Vec::with_capacity(months.len());
    for (month, sales) in months.iter().zip(sales) {
        match parse_date(month) {
            Some(month) => series.push(MonthlyPoint { month, sales }),
            None => warn!("Skipping unreadable month bucket {:?}", month),
        }
    }
    Ok(series)
}

pub struct ForecastAdapter {
    model: Box<dyn SeriesModel>,
}

impl ForecastAdapter {
    pub fn new(model: Box<dyn SeriesModel>) -> Self {
        Self { model }
    }

    /// Adapter over the default monthly smoothing model
    pub fn monthly() -> Result<Self> {
        Ok(Self::new(Box::new(SmoothingModel::monthly()?)))
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Forecast `periods` months past the end of `history`.
    ///
    /// Short histories come back with no forecast and zero error. Otherwise
    /// the model is scored on the last [`BACKTEST_HOLDOUT`] months, then
    /// refit on everything for the projection.
    pub fn forecast_series(&self, history: Vec<MonthlyPoint>, periods: usize) -> Result<ForecastResult> {
        if history.len() < MIN_HISTORY_MONTHS {
            info!(
                "📉 {} months of history, need {} to forecast",
                history.len(),
                MIN_HISTORY_MONTHS
            );
            return Ok(ForecastResult {
                history,
                forecast: None,
                mape: 0.0,
            });
        }

        let values: Vec<f64> = history.iter().map(|p| p.sales).collect();
        let split = values.len() - BACKTEST_HOLDOUT;
        let backtest = self.model.fit_predict(&values[..split], BACKTEST_HOLDOUT)?;
        let mape = mape(&values[split..], &backtest.mean);
        debug!("Backtest MAPE {:.2}% with {}", mape, self.model.name());

        let projection = self.model.fit_predict(&values, periods)?;
        let last_month = history[history.len() - 1].month;
        let mut points = Vec::with_capacity(periods);
        for h in 0..periods {
            points.push(ForecastPoint {
                month: month_after(last_month, h + 1)?,
                yhat: projection.mean[h],
                lower: projection.lower[h],
                upper: projection.upper[h],
            });
        }

        info!("📈 Forecast {} months ahead (backtest MAPE {:.1}%)", periods, mape);
        Ok(ForecastResult {
            history,
            forecast: Some(points),
            mape,
        })
    }

    pub fn forecast(&self, gateway: &QueryGateway, periods: usize) -> Result<ForecastResult> {
        self.forecast_series(monthly_sales(gateway)?, periods)
    }
}
