use chrono::NaiveDate;
use error_stack::{Report, bail};
use serde::Serialize;

use crate::analytics::{Analysis, close_prices};
use crate::error::AnalyticsError;
use crate::model::PriceSeries;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovingAveragePoint {
    pub date: NaiveDate,
    pub close: f64,
    pub average: f64,
}

/// One entry per input point once the window is filled.
pub type MovingAverageResult = Vec<MovingAveragePoint>;

/// Trailing simple moving average of closing prices.
pub struct MovingAverage {
    window: usize,
}

impl MovingAverage {
    pub fn new(window: usize) -> Result<Self, Report<AnalyticsError>> {
        if window == 0 {
            bail!(AnalyticsError::InvalidParameter {
                name: "window must be > 0".into(),
            });
        }
        Ok(Self { window })
    }

    /// Calculate averages from a price slice (internal helper).
    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Vec<f64>, Report<AnalyticsError>> {
        if prices.len() < self.window {
            bail!(AnalyticsError::InvalidParameter {
                name: format!(
                    "window {} exceeds series length {}",
                    self.window,
                    prices.len()
                ),
            });
        }
        Ok(prices
            .windows(self.window)
            .map(|w| w.iter().sum::<f64>() / self.window as f64)
            .collect())
    }
}

impl Analysis for MovingAverage {
    type Output = MovingAverageResult;

    fn name(&self) -> &str {
        "moving_average"
    }

    fn required_points(&self) -> usize {
        self.window
    }

    fn calculate(&self, series: &PriceSeries) -> Result<MovingAverageResult, Report<AnalyticsError>> {
        let averages = self.calculate_prices(&close_prices(series))?;
        Ok(series.points()[self.window - 1..]
            .iter()
            .zip(averages)
            .map(|(p, average)| MovingAveragePoint {
                date: p.date,
                close: p.close,
                average,
            })
            .collect())
    }
}
