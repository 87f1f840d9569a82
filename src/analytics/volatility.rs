use error_stack::{Report, bail};
use serde::Serialize;

use crate::analytics::{Analysis, TRADING_DAYS_PER_YEAR, close_prices};
use crate::error::AnalyticsError;
use crate::model::PriceSeries;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityResult {
    /// Sample standard deviation of per-period simple returns.
    pub std_dev: f64,
    /// `std_dev * sqrt(periods_per_year)`, when requested.
    pub annualized: Option<f64>,
    pub mean_return: f64,
    /// Number of returns the estimate is based on.
    pub periods: usize,
}

/// Volatility of simple close-to-close returns.
pub struct Volatility {
    annualize: bool,
    periods_per_year: u32,
}

impl Volatility {
    pub fn new(annualize: bool) -> Self {
        Self {
            annualize,
            periods_per_year: TRADING_DAYS_PER_YEAR,
        }
    }

    /// Annualize with `periods_per_year` instead of trading days.
    pub fn periods_per_year(self, periods_per_year: u32) -> Result<Self, Report<AnalyticsError>> {
        if periods_per_year == 0 {
            bail!(AnalyticsError::InvalidParameter {
                name: "periods_per_year must be > 0".into(),
            });
        }
        Ok(Self {
            periods_per_year,
            ..self
        })
    }
}

/// Per-period simple returns `(c[i] - c[i-1]) / c[i-1]`.
///
/// Every prior close is checked before any return is computed.
pub fn simple_returns(prices: &[f64]) -> Result<Vec<f64>, Report<AnalyticsError>> {
    if let Some(index) = prices
        .iter()
        .take(prices.len().saturating_sub(1))
        .position(|&p| p == 0.0)
    {
        bail!(AnalyticsError::DivisionByZero { index });
    }
    Ok(prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect())
}

/// Bessel-corrected standard deviation; `0.0` for fewer than two samples.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (sum_sq / (n - 1.0)).sqrt()
}

impl Analysis for Volatility {
    type Output = VolatilityResult;

    fn name(&self) -> &str {
        "volatility"
    }

    fn required_points(&self) -> usize {
        2
    }

    fn calculate(&self, series: &PriceSeries) -> Result<VolatilityResult, Report<AnalyticsError>> {
        if series.len() < self.required_points() {
            bail!(AnalyticsError::InvalidParameter {
                name: format!(
                    "volatility needs at least {} points, got {}",
                    self.required_points(),
                    series.len()
                ),
            });
        }

        let returns = simple_returns(&close_prices(series))?;
        let std_dev = sample_std_dev(&returns);
        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;

        Ok(VolatilityResult {
            std_dev,
            annualized: self
                .annualize
                .then(|| std_dev * f64::from(self.periods_per_year).sqrt()),
            mean_return,
            periods: returns.len(),
        })
    }
}
