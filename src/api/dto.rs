use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::model::{DateRange, Period};

// ── Query bounds ──────────────────────────────────────────────────────────────

pub const MAX_STOCK_PAGE: usize = 500;
/// SQLite binds OFFSET as a signed 64-bit integer.
pub const MAX_SKIP: usize = i64::MAX as usize;
pub const MAX_PRICE_PAGE: usize = 1000;
pub const WINDOW_BOUNDS: (usize, usize) = (5, 200);
pub const DAYS_AHEAD_BOUNDS: (usize, usize) = (1, 365);
pub const PROJECTION_LOOKBACK_BOUNDS: (usize, usize) = (10, 365);
pub const VOLATILITY_LOOKBACK_BOUNDS: (usize, usize) = (5, 365);

/// Reject `value` outside `min..=max` with a 400.
pub fn check_bounds(name: &str, value: usize, (min, max): (usize, usize)) -> Result<(), ApiError> {
    if !(min..=max).contains(&value) {
        return Err(ApiError::BadRequest(format!(
            "{name} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

pub fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<DateRange, ApiError> {
    DateRange::new(start, end).map_err(|report| ApiError::BadRequest(report.current_context().to_string()))
}

// ── Health ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ── Stocks ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListStocksQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_stock_limit")]
    pub limit: usize,
    #[serde(default = "default_true")]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

// ── Prices ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_price_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct FetchPricesRequest {
    pub symbol: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub period: Option<String>,
}

impl FetchPricesRequest {
    pub fn period(&self) -> Result<Period, ApiError> {
        match self.period.as_deref() {
            None => Ok(Period::default()),
            Some(p) => Period::from_str(p)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown period: {p}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MovingAverageQuery {
    #[serde(default = "default_window")]
    pub window: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectionQuery {
    #[serde(default = "default_days_ahead")]
    pub days_ahead: usize,
    #[serde(default = "default_projection_lookback")]
    pub lookback_days: usize,
}

#[derive(Debug, Deserialize)]
pub struct VolatilityQuery {
    #[serde(default = "default_volatility_lookback")]
    pub lookback_days: usize,
}

fn default_stock_limit() -> usize {
    100
}

fn default_price_limit() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_window() -> usize {
    20
}

fn default_days_ahead() -> usize {
    30
}

fn default_projection_lookback() -> usize {
    90
}

fn default_volatility_lookback() -> usize {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        assert!(check_bounds("window", 5, WINDOW_BOUNDS).is_ok());
        assert!(check_bounds("window", 200, WINDOW_BOUNDS).is_ok());
        assert!(check_bounds("window", 4, WINDOW_BOUNDS).is_err());
        assert!(check_bounds("window", 201, WINDOW_BOUNDS).is_err());
    }

    #[test]
    fn fetch_period_defaults_to_one_month() {
        let request: FetchPricesRequest = serde_json::from_str(r#"{"symbol": "AAPL"}"#).unwrap();
        assert_eq!(request.period().unwrap(), Period::Month1);

        let request: FetchPricesRequest =
            serde_json::from_str(r#"{"symbol": "AAPL", "period": "2w"}"#).unwrap();
        assert!(request.period().is_err());
    }
}
