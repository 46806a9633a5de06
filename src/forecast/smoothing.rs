//! Exponential smoothing models
//!
//! - **Holt's linear trend**: level + trend
//! - **Additive Holt-Winters**: level + trend + seasonal component
//!
//! Both track one-step-ahead residuals while fitting so the caller can derive
//! an uncertainty band around the point forecast.

use crate::error::{RetailError, Result};
use crate::forecast::{Projection, SeriesModel};
use tracing::debug;

/// z-score for an 80% two-sided interval
pub const INTERVAL_Z: f64 = 1.2816;

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0 < value && value < 1.0) {
        return Err(RetailError::Forecast(format!(
            "{} must be between 0 and 1 (exclusive), got {}",
            name, value
        )));
    }
    Ok(())
}

/// Fitted smoothing state
#[derive(Clone, Debug)]
struct SmoothingState {
    level: f64,
    trend: f64,
    /// Empty for non-seasonal models
    seasonal: Vec<f64>,
    /// Observations consumed, used to align the seasonal index
    observed: usize,
    residuals: Vec<f64>,
}

impl SmoothingState {
    fn point(&self, h: usize) -> f64 {
        let base = self.level + h as f64 * self.trend;
        if self.seasonal.is_empty() {
            base
        } else {
            base + self.seasonal[(self.observed + h - 1) % self.seasonal.len()]
        }
    }

    fn residual_sd(&self) -> f64 {
        if self.residuals.is_empty() {
            return 0.0;
        }
        let mse = self.residuals.iter().map(|r| r * r).sum::<f64>() / self.residuals.len() as f64;
        mse.sqrt()
    }

    fn project(&self, horizon: usize) -> Projection {
        let sd = self.residual_sd();
        let mut projection = Projection::with_capacity(horizon);
        for h in 1..=horizon {
            let yhat = self.point(h);
            let half_width = INTERVAL_Z * sd * (h as f64).sqrt();
            projection.mean.push(yhat);
            projection.lower.push(yhat - half_width);
            projection.upper.push(yhat + half_width);
        }
        projection
    }
}

/// Double exponential smoothing (Holt's linear trend method)
#[derive(Clone, Debug)]
pub struct HoltLinear {
    alpha: f64,
    beta: f64,
}

impl HoltLinear {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        check_unit("alpha", alpha)?;
        check_unit("beta", beta)?;
        Ok(Self { alpha, beta })
    }

    fn fit(&self, data: &[f64]) -> Result<SmoothingState> {
        if data.len() < 3 {
            return Err(RetailError::Forecast(format!(
                "Holt's method needs at least 3 observations, got {}",
                data.len()
            )));
        }

        let mut level = data[0];
        let mut trend = data[1] - data[0];
        let mut residuals = Vec::with_capacity(data.len() - 1);

        for &value in &data[1..] {
            residuals.push(value - (level + trend));
            let prev_level = level;
            level = self.alpha * value + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - prev_level) + (1.0 - self.beta) * trend;
        }

        Ok(SmoothingState {
            level,
            trend,
            seasonal: Vec::new(),
            observed: data.len(),
            residuals,
        })
    }
}

/// Triple exponential smoothing with additive seasonality
#[derive(Clone, Debug)]
pub struct HoltWintersAdditive {
    alpha: f64,
    beta: f64,
    gamma: f64,
    period: usize,
}

impl HoltWintersAdditive {
    pub fn new(alpha: f64, beta: f64, gamma: f64, period: usize) -> Result<Self> {
        check_unit("alpha", alpha)?;
        check_unit("beta", beta)?;
        check_unit("gamma", gamma)?;
        if period < 2 {
            return Err(RetailError::Forecast("period must be at least 2".to_string()));
        }
        Ok(Self {
            alpha,
            beta,
            gamma,
            period,
        })
    }

    pub fn min_observations(&self) -> usize {
        self.period * 2
    }

    fn fit(&self, data: &[f64]) -> Result<SmoothingState> {
        if data.len() < self.min_observations() {
            return Err(RetailError::Forecast(format!(
                "Holt-Winters needs at least {} observations, got {}",
                self.min_observations(),
                data.len()
            )));
        }

        let p = self.period;
        let first_avg = data[..p].iter().sum::<f64>() / p as f64;
        let second_avg = data[p..2 * p].iter().sum::<f64>() / p as f64;

        let mut level = first_avg;
        let mut trend = (second_avg - first_avg) / p as f64;
        let mut seasonal: Vec<f64> = data[..p].iter().map(|v| v - first_avg).collect();
        let mut residuals = Vec::with_capacity(data.len() - p);

        for (i, &value) in data.iter().enumerate().skip(p) {
            let idx = i % p;
            let prev_level = level;
            let prev_seasonal = seasonal[idx];

            residuals.push(value - (level + trend + prev_seasonal));
            level = self.alpha * (value - prev_seasonal) + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - prev_level) + (1.0 - self.beta) * trend;
            seasonal[idx] = self.gamma * (value - level) + (1.0 - self.gamma) * prev_seasonal;
        }

        Ok(SmoothingState {
            level,
            trend,
            seasonal,
            observed: data.len(),
            residuals,
        })
    }
}

/// Default forecasting model: yearly-seasonal Holt-Winters on monthly data
/// when two full years are available, Holt's trend method otherwise.
#[derive(Clone, Debug)]
pub struct SmoothingModel {
    seasonal: HoltWintersAdditive,
    trend: HoltLinear,
}

impl SmoothingModel {
    pub fn monthly() -> Result<Self> {
        Ok(Self {
            seasonal: HoltWintersAdditive::new(0.3, 0.1, 0.2, 12)?,
            trend: HoltLinear::new(0.3, 0.1)?,
        })
    }
}

impl SeriesModel for SmoothingModel {
    fn name(&self) -> &str {
        "exponential-smoothing"
    }

    fn fit_predict(&self, history: &[f64], horizon: usize) -> Result<Projection> {
        let state = if history.len() >= self.seasonal.min_observations() {
            debug!("Fitting Holt-Winters on {} points", history.len());
            self.seasonal.fit(history)?
        } else {
            debug!("Fitting Holt linear trend on {} points", history.len());
            self.trend.fit(history)?
        };
        Ok(state.project(horizon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holt_follows_linear_trend() {
        let data: Vec<f64> = (0..20).map(|i| 10.0 + i as f64 * 2.0).collect();
        let state = HoltLinear::new(0.3, 0.1).unwrap().fit(&data).unwrap();
        let projection = state.project(3);

        assert_eq!(projection.mean.len(), 3);
        assert!((projection.mean[0] - 50.0).abs() < 1e-6);
        assert!(projection.mean[1] > projection.mean[0]);
        // exact fit leaves no residual spread
        assert!((projection.upper[2] - projection.lower[2]).abs() < 1e-6);
    }

    #[test]
    fn test_holt_winters_tracks_season() {
        let data: Vec<f64> = (0..48)
            .map(|i| 100.0 + 20.0 * ((i as f64 * std::f64::consts::PI / 6.0).sin()))
            .collect();
        let model = HoltWintersAdditive::new(0.3, 0.1, 0.2, 12).unwrap();
        let projection = model.fit(&data).unwrap().project(12);

        assert_eq!(projection.mean.len(), 12);
        // sine peaks at the fourth month of each cycle
        let peak = projection
            .mean
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 3);
    }

    #[test]
    fn test_bands_widen_with_horizon() {
        let data = vec![10.0, 14.0, 9.0, 16.0, 11.0, 18.0, 12.0, 19.0, 13.0];
        let projection = SmoothingModel::monthly().unwrap().fit_predict(&data, 3).unwrap();
        let width = |h: usize| projection.upper[h] - projection.lower[h];

        assert!(width(0) > 0.0);
        assert!(width(2) > width(0));
        for h in 0..3 {
            assert!(projection.lower[h] <= projection.mean[h] && projection.mean[h] <= projection.upper[h]);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(HoltLinear::new(0.0, 0.1).is_err());
        assert!(HoltWintersAdditive::new(0.3, 0.1, 1.0, 12).is_err());
        assert!(HoltWintersAdditive::new(0.3, 0.1, 0.2, 1).is_err());
    }
}
