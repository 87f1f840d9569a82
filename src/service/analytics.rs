use std::sync::Arc;

use chrono::NaiveDate;
use error_stack::{Report, ResultExt, bail};
use serde::Serialize;
use tracing::debug;

use crate::analytics::moving_average::MovingAverage;
use crate::analytics::projection::{LinearProjection, Trend};
use crate::analytics::summary::Summary;
use crate::analytics::volatility::Volatility;
use crate::analytics::{Analysis, TRADING_DAYS_PER_YEAR, round_to};
use crate::error::{AnalyticsError, ServiceError};
use crate::model::{DateRange, PriceSeries, series_from_rows};
use crate::service::require_stock;
use crate::storage::Storage;

/// Most recent rows considered by a moving average request.
pub const MOVING_AVERAGE_ROW_LIMIT: usize = 1000;
/// Fewest lookback points a projection is fitted on.
pub const MIN_PROJECTION_POINTS: usize = 10;
/// Rates and fit quality are reported with more precision than prices.
const RATE_PRECISION: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsSettings {
    pub periods_per_year: u32,
    pub display_precision: u32,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            periods_per_year: TRADING_DAYS_PER_YEAR,
            display_precision: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovingAverageEntry {
    pub date: NaiveDate,
    pub close_price: f64,
    pub moving_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionEntry {
    pub date: NaiveDate,
    pub projected_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionReport {
    pub stock_id: i64,
    pub last_price: f64,
    pub last_date: NaiveDate,
    pub trend: Trend,
    pub daily_change_rate: f64,
    pub r_squared: f64,
    pub projections: Vec<ProjectionEntry>,
}

/// Volatility and returns are percentages; volatility is annualized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityReport {
    pub stock_id: i64,
    pub period_days: usize,
    pub volatility: f64,
    pub avg_daily_return: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub price_range_pct: f64,
}

/// Runs the analytics engine over stored prices and shapes the results
/// for display.
#[derive(Clone)]
pub struct AnalyticsService {
    storage: Arc<dyn Storage>,
    settings: AnalyticsSettings,
}

impl AnalyticsService {
    pub fn new(storage: Arc<dyn Storage>, settings: AnalyticsSettings) -> Self {
        Self { storage, settings }
    }

    async fn load_series(
        &self,
        stock_id: i64,
        range: DateRange,
        limit: usize,
    ) -> Result<PriceSeries, Report<ServiceError>> {
        let stock = require_stock(self.storage.as_ref(), stock_id).await?;
        let rows = self
            .storage
            .get_prices(stock.id, range, Some(limit))
            .await
            .change_context(ServiceError::Storage)?;
        series_from_rows(stock.id, &rows).change_context(ServiceError::Analytics)
    }

    pub async fn moving_average(
        &self,
        stock_id: i64,
        window: usize,
        range: DateRange,
    ) -> Result<Vec<MovingAverageEntry>, Report<ServiceError>> {
        let analysis = MovingAverage::new(window).change_context(ServiceError::Analytics)?;
        let series = self
            .load_series(stock_id, range, MOVING_AVERAGE_ROW_LIMIT)
            .await?;
        if series.len() < analysis.required_points() {
            bail!(ServiceError::InsufficientData {
                reason: format!(
                    "moving average window {window} needs {window} prices, have {}",
                    series.len()
                ),
            });
        }

        let points = analysis
            .calculate(&series)
            .change_context(ServiceError::Analytics)?;
        debug!(
            stock_id = series.stock_id(),
            analysis = analysis.name(),
            window,
            points = points.len(),
            "analysis computed"
        );

        Ok(points
            .into_iter()
            .map(|p| MovingAverageEntry {
                date: p.date,
                close_price: p.close,
                moving_average: round_to(p.average, self.settings.display_precision),
            })
            .collect())
    }

    /// Linear trend over the last `lookback` stored prices, continued for
    /// `horizon` calendar days. Projected prices are floored at zero.
    pub async fn projection(
        &self,
        stock_id: i64,
        horizon: usize,
        lookback: usize,
    ) -> Result<ProjectionReport, Report<ServiceError>> {
        let analysis = LinearProjection::new(horizon).change_context(ServiceError::Analytics)?;
        let series = self
            .load_series(stock_id, DateRange::all(), lookback)
            .await?;
        let Some(last) = series.last().cloned() else {
            bail!(ServiceError::InsufficientData {
                reason: "no historical prices".into(),
            });
        };
        if series.len() < MIN_PROJECTION_POINTS {
            bail!(ServiceError::InsufficientData {
                reason: format!(
                    "projection needs {MIN_PROJECTION_POINTS} prices, have {}",
                    series.len()
                ),
            });
        }

        let result = analysis
            .calculate(&series)
            .change_context(ServiceError::Analytics)?;
        debug!(
            stock_id = series.stock_id(),
            analysis = analysis.name(),
            points = series.len(),
            slope = result.slope,
            "analysis computed"
        );
        let precision = self.settings.display_precision;

        Ok(ProjectionReport {
            stock_id,
            last_price: last.close,
            last_date: last.date,
            trend: result.trend,
            daily_change_rate: round_to(result.slope, RATE_PRECISION),
            r_squared: round_to(result.r_squared, RATE_PRECISION),
            projections: result
                .projections
                .into_iter()
                .map(|p| ProjectionEntry {
                    date: p.date,
                    projected_price: round_to(p.price.max(0.0), precision),
                })
                .collect(),
        })
    }

    /// Annualized volatility of daily returns over the last `lookback`
    /// stored prices.
    pub async fn volatility(
        &self,
        stock_id: i64,
        lookback: usize,
    ) -> Result<VolatilityReport, Report<ServiceError>> {
        let analysis = Volatility::new(true)
            .periods_per_year(self.settings.periods_per_year)
            .change_context(ServiceError::Analytics)?;
        let series = self
            .load_series(stock_id, DateRange::all(), lookback)
            .await?;
        if series.len() < analysis.required_points() {
            bail!(ServiceError::InsufficientData {
                reason: format!("volatility needs 2 prices, have {}", series.len()),
            });
        }

        let result = analysis
            .calculate(&series)
            .change_context(ServiceError::Analytics)?;
        debug!(
            stock_id = series.stock_id(),
            analysis = analysis.name(),
            periods = result.periods,
            "analysis computed"
        );
        let summary = Summary::new()
            .calculate(&series)
            .change_context(ServiceError::Analytics)?;
        if summary.min <= 0.0 {
            let index = series
                .points()
                .iter()
                .position(|p| p.close <= 0.0)
                .unwrap_or_default();
            return Err(Report::new(AnalyticsError::DivisionByZero { index })
            .change_context(ServiceError::Analytics)
            .attach("price range is relative to a zero minimum close"));
        }

        let precision = self.settings.display_precision;
        Ok(VolatilityReport {
            stock_id,
            period_days: series.len(),
            volatility: round_to(result.annualized.unwrap_or(result.std_dev) * 100.0, precision),
            avg_daily_return: round_to(result.mean_return * 100.0, RATE_PRECISION),
            min_price: round_to(summary.min, precision),
            max_price: round_to(summary.max, precision),
            price_range_pct: round_to((summary.max - summary.min) / summary.min * 100.0, precision),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::date;
    use crate::service::testing::{memory_storage, seed};

    async fn service_with(closes: &[f64]) -> (AnalyticsService, i64) {
        let storage = memory_storage().await;
        let stock = seed(storage.as_ref(), "TEST", closes).await;
        (
            AnalyticsService::new(storage, AnalyticsSettings::default()),
            stock.id,
        )
    }

    #[tokio::test]
    async fn moving_average_is_rounded_and_dated_at_window_end() {
        let (service, id) = service_with(&[100.0, 102.0, 101.0, 105.0, 110.0]).await;
        let entries = service
            .moving_average(id, 3, DateRange::all())
            .await
            .unwrap();
        let averages: Vec<f64> = entries.iter().map(|e| e.moving_average).collect();
        assert_eq!(averages, vec![101.0, 102.67, 105.33]);
        assert_eq!(entries[0].date, date(2));
        assert_eq!(entries[0].close_price, 101.0);
    }

    #[tokio::test]
    async fn moving_average_with_too_few_prices() {
        let (service, id) = service_with(&[1.0, 2.0]).await;
        let err = service
            .moving_average(id, 5, DateRange::all())
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::InsufficientData { .. }));
    }

    #[tokio::test]
    async fn moving_average_respects_range() {
        let (service, id) = service_with(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).await;
        let range = DateRange::new(Some(date(2)), None).unwrap();
        let entries = service.moving_average(id, 2, range).await.unwrap();
        let averages: Vec<f64> = entries.iter().map(|e| e.moving_average).collect();
        assert_eq!(averages, vec![3.5, 4.5, 5.5]);
    }

    #[tokio::test]
    async fn unknown_stock_is_not_found() {
        let (service, _) = service_with(&[1.0]).await;
        let err = service.volatility(999, 30).await.unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::NotFound { .. }));
        let err = service.projection(999, 5, 90).await.unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn projection_over_a_line() {
        let closes: Vec<f64> = (0..20).map(|i| 50.0 + 2.0 * i as f64).collect();
        let (service, id) = service_with(&closes).await;
        let report = service.projection(id, 3, 90).await.unwrap();

        assert_eq!(report.trend, Trend::Bullish);
        assert_eq!(report.daily_change_rate, 2.0);
        assert_eq!(report.r_squared, 1.0);
        assert_eq!(report.last_price, 88.0);
        assert_eq!(report.last_date, date(19));
        let prices: Vec<f64> = report.projections.iter().map(|p| p.projected_price).collect();
        assert_eq!(prices, vec![90.0, 92.0, 94.0]);
        assert_eq!(report.projections[0].date, date(20));
    }

    #[tokio::test]
    async fn projection_uses_only_the_lookback() {
        // Falling history followed by a flat tail.
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        closes.extend(std::iter::repeat_n(80.0, 10));
        let (service, id) = service_with(&closes).await;

        let report = service.projection(id, 1, 10).await.unwrap();
        assert_eq!(report.daily_change_rate, 0.0);
        assert_eq!(report.trend, Trend::Bearish);
        assert_eq!(report.projections[0].projected_price, 80.0);
    }

    #[tokio::test]
    async fn projection_is_floored_at_zero() {
        let closes: Vec<f64> = (0..10).map(|i| 45.0 - 5.0 * i as f64).collect();
        let (service, id) = service_with(&closes).await;
        let report = service.projection(id, 3, 90).await.unwrap();
        let prices: Vec<f64> = report.projections.iter().map(|p| p.projected_price).collect();
        assert_eq!(prices, vec![0.0, 0.0, 0.0]);
        assert_eq!(report.trend, Trend::Bearish);
    }

    #[tokio::test]
    async fn projection_needs_ten_points() {
        let (service, id) = service_with(&[1.0, 2.0, 3.0, 4.0, 5.0]).await;
        let err = service.projection(id, 5, 90).await.unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::InsufficientData { .. }));
    }

    #[tokio::test]
    async fn volatility_of_flat_prices_is_zero() {
        let (service, id) = service_with(&[50.0; 8]).await;
        let report = service.volatility(id, 30).await.unwrap();
        assert_eq!(report.volatility, 0.0);
        assert_eq!(report.avg_daily_return, 0.0);
        assert_eq!(report.period_days, 8);
        assert_eq!(report.price_range_pct, 0.0);
    }

    #[tokio::test]
    async fn volatility_report_in_percent() {
        let (service, id) = service_with(&[100.0, 110.0, 99.0]).await;
        let report = service.volatility(id, 30).await.unwrap();
        // returns: +10%, -10%; sample std = 0.141421..., annualized * 100
        let expected = (0.02f64).sqrt() * (252f64).sqrt() * 100.0;
        assert_eq!(report.volatility, round_to(expected, 2));
        assert_eq!(report.avg_daily_return, 0.0);
        assert_eq!(report.min_price, 99.0);
        assert_eq!(report.max_price, 110.0);
        assert_eq!(report.price_range_pct, 11.11);
    }

    #[tokio::test]
    async fn volatility_with_zero_close_is_not_computable() {
        let (service, id) = service_with(&[10.0, 0.0, 5.0]).await;
        let err = service.volatility(id, 30).await.unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::Analytics));
        assert_eq!(
            err.downcast_ref::<AnalyticsError>(),
            Some(&AnalyticsError::DivisionByZero { index: 1 })
        );
    }

    #[tokio::test]
    async fn volatility_with_zero_last_close_reports_its_position() {
        let (service, id) = service_with(&[10.0, 12.0, 0.0]).await;
        let err = service.volatility(id, 30).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalyticsError>(),
            Some(&AnalyticsError::DivisionByZero { index: 2 })
        );

        let (service, id) = service_with(&[10.0, 0.0]).await;
        let err = service.volatility(id, 30).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalyticsError>(),
            Some(&AnalyticsError::DivisionByZero { index: 1 })
        );
    }
}
