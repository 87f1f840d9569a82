pub mod yahoo;

use chrono::NaiveDate;
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::ProviderError;
use crate::model::{Period, PricePoint, StockInfo};

/// What slice of daily history to fetch.
///
/// Explicit `start` and `end` (both inclusive) take precedence over
/// `period`; when either is missing the provider falls back to `period`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryRequest {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub period: Period,
}

/// Abstraction over a third-party market data source.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn MarketDataProvider`).
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch company metadata. `None` when the provider does not know the
    /// symbol or it has no market price.
    fn fetch_stock_info(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<StockInfo>, Report<ProviderError>>>;

    /// Fetch daily bars, ascending by date with unique dates.
    fn fetch_history(
        &self,
        symbol: &str,
        request: HistoryRequest,
    ) -> BoxFuture<'_, Result<Vec<PricePoint>, Report<ProviderError>>>;
}
