//! Naive linear trend extrapolation.
//!
//! Fits `close = intercept + slope * i` by ordinary least squares over the
//! zero-based index of the observed series and continues the line. This is
//! not a forecast: there are no confidence intervals, only R² as a fit
//! indicator.

use chrono::{Duration, NaiveDate};
use error_stack::{Report, bail};
use serde::Serialize;

use crate::analytics::{Analysis, close_prices};
use crate::error::AnalyticsError;
use crate::model::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedPrice {
    pub date: NaiveDate,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionResult {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub trend: Trend,
    pub projections: Vec<ProjectedPrice>,
}

pub struct LinearProjection {
    horizon: usize,
}

/// Least-squares line through `(i, y[i])`: `(slope, intercept)`.
pub fn fit_line(ys: &[f64]) -> (f64, f64) {
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (sxy, sxx) = ys
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, &y)| {
            let dx = i as f64 - mean_x;
            (sxy + dx * (y - mean_y), sxx + dx * dx)
        });

    let slope = sxy / sxx;
    (slope, mean_y - slope * mean_x)
}

fn r_squared(ys: &[f64], slope: f64, intercept: f64) -> f64 {
    let mean_y = ys.iter().sum::<f64>() / ys.len() as f64;
    let (ss_res, ss_tot) = ys
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(res, tot), (i, &y)| {
            let fitted = intercept + slope * i as f64;
            (res + (y - fitted).powi(2), tot + (y - mean_y).powi(2))
        });

    // A flat series is fitted exactly by a flat line.
    if ss_tot == 0.0 {
        return 1.0;
    }
    1.0 - ss_res / ss_tot
}

impl LinearProjection {
    pub fn new(horizon: usize) -> Result<Self, Report<AnalyticsError>> {
        if horizon == 0 {
            bail!(AnalyticsError::InvalidParameter {
                name: "horizon must be > 0".into(),
            });
        }
        Ok(Self { horizon })
    }
}

impl Analysis for LinearProjection {
    type Output = ProjectionResult;

    fn name(&self) -> &str {
        "linear_projection"
    }

    fn required_points(&self) -> usize {
        2
    }

    fn calculate(&self, series: &PriceSeries) -> Result<ProjectionResult, Report<AnalyticsError>> {
        if series.len() < self.required_points() {
            bail!(AnalyticsError::InvalidParameter {
                name: format!(
                    "projection needs at least {} points, got {}",
                    self.required_points(),
                    series.len()
                ),
            });
        }

        let closes = close_prices(series);
        let (slope, intercept) = fit_line(&closes);
        let n = closes.len();
        let last_date = series.points()[n - 1].date;

        let projections = (1..=self.horizon)
            .map(|k| ProjectedPrice {
                date: last_date + Duration::days(k as i64),
                price: intercept + slope * (n - 1 + k) as f64,
            })
            .collect();

        Ok(ProjectionResult {
            slope,
            intercept,
            r_squared: r_squared(&closes, slope, intercept),
            trend: if slope > 0.0 {
                Trend::Bullish
            } else {
                Trend::Bearish
            },
            projections,
        })
    }
}
