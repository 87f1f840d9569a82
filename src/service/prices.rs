use std::sync::Arc;

use chrono::NaiveDate;
use error_stack::{Report, ResultExt, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::analytics::summary::Summary;
use crate::analytics::{Analysis, round_to};
use crate::error::{AnalyticsError, ServiceError};
use crate::model::{DateRange, Period, StockPrice, series_from_rows};
use crate::provider::{HistoryRequest, MarketDataProvider};
use crate::service::{StockService, require_stock, require_stock_by_symbol};
use crate::storage::Storage;

#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub symbol: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub period: Period,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchSummary {
    pub success: bool,
    pub stock_id: i64,
    pub symbol: String,
    pub total_fetched: usize,
    pub new_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    pub symbol: String,
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
    pub total_records: usize,
    pub date_range_start: NaiveDate,
    pub date_range_end: NaiveDate,
}

#[derive(Clone)]
pub struct PriceService {
    storage: Arc<dyn Storage>,
    provider: Arc<dyn MarketDataProvider>,
    stocks: StockService,
    precision: u32,
}

impl PriceService {
    pub fn new(
        storage: Arc<dyn Storage>,
        provider: Arc<dyn MarketDataProvider>,
        precision: u32,
    ) -> Self {
        let stocks = StockService::new(Arc::clone(&storage), Arc::clone(&provider));
        Self {
            storage,
            provider,
            stocks,
            precision,
        }
    }

    /// Pull daily history from the provider and append the unseen days.
    ///
    /// The stock is created from provider metadata when it is not tracked
    /// yet. An unknown symbol or an empty history is an invalid request.
    pub async fn fetch_and_store(
        &self,
        request: FetchRequest,
    ) -> Result<FetchSummary, Report<ServiceError>> {
        let symbol = request.symbol.trim().to_uppercase();
        DateRange::new(request.start, request.end).change_context(ServiceError::InvalidRequest {
            reason: "start_date is after end_date".into(),
        })?;

        let stock = match self.stocks.add_from_symbol(&symbol).await {
            Ok(stock) => stock,
            Err(report) if matches!(report.current_context(), ServiceError::NotFound { .. }) => {
                return Err(report.change_context(ServiceError::InvalidRequest {
                    reason: format!("stock {symbol} not found"),
                }));
            }
            Err(report) => return Err(report),
        };

        let history = HistoryRequest {
            start: request.start,
            end: request.end,
            period: request.period,
        };
        let points = self
            .provider
            .fetch_history(&symbol, history)
            .await
            .change_context(ServiceError::Provider)
            .attach_with(|| format!("symbol: {symbol}"))?;

        if points.is_empty() {
            warn!(symbol = %symbol, period = %request.period, "provider returned no prices");
            bail!(ServiceError::InvalidRequest {
                reason: "no price data found".into(),
            });
        }

        let new_records = self
            .storage
            .insert_prices(stock.id, &points)
            .await
            .change_context(ServiceError::Storage)?;

        info!(
            symbol = %symbol,
            stock_id = stock.id,
            fetched = points.len(),
            new_records,
            "prices stored"
        );

        Ok(FetchSummary {
            success: true,
            stock_id: stock.id,
            symbol,
            total_fetched: points.len(),
            new_records,
        })
    }

    pub async fn prices(
        &self,
        stock_id: i64,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<StockPrice>, Report<ServiceError>> {
        let stock = require_stock(self.storage.as_ref(), stock_id).await?;
        self.stored_prices(stock.id, range, limit).await
    }

    pub async fn prices_by_symbol(
        &self,
        symbol: &str,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<StockPrice>, Report<ServiceError>> {
        let stock = require_stock_by_symbol(self.storage.as_ref(), symbol).await?;
        self.stored_prices(stock.id, range, limit).await
    }

    async fn stored_prices(
        &self,
        stock_id: i64,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<StockPrice>, Report<ServiceError>> {
        self.storage
            .get_prices(stock_id, range, Some(limit))
            .await
            .change_context(ServiceError::Storage)
    }

    /// Min / max / mean close over the stored history inside `range`.
    pub async fn stats(
        &self,
        stock_id: i64,
        range: DateRange,
    ) -> Result<PriceStats, Report<ServiceError>> {
        let stock = require_stock(self.storage.as_ref(), stock_id).await?;
        let rows = self
            .storage
            .get_prices(stock.id, range, None)
            .await
            .change_context(ServiceError::Storage)?;

        let series = series_from_rows(stock.id, &rows).change_context(ServiceError::Analytics)?;
        let summary = match Summary::within(range).calculate(&series) {
            Ok(summary) => summary,
            Err(report) if matches!(report.current_context(), AnalyticsError::EmptySeries) => {
                return Err(report.change_context(ServiceError::NoData));
            }
            Err(report) => return Err(report.change_context(ServiceError::Analytics)),
        };

        Ok(PriceStats {
            symbol: stock.symbol,
            min_price: round_to(summary.min, self.precision),
            max_price: round_to(summary.max, self.precision),
            avg_price: round_to(summary.mean, self.precision),
            total_records: summary.count,
            date_range_start: summary.first_date,
            date_range_end: summary.last_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::date;
    use crate::provider::stub::StubProvider;
    use crate::service::testing::{memory_storage, provider_with, seed};

    #[tokio::test]
    async fn fetch_creates_stock_and_stores_prices() {
        let storage = memory_storage().await;
        let service = PriceService::new(
            Arc::clone(&storage),
            provider_with("AAPL", &[10.0, 11.0, 12.0]),
            2,
        );

        let summary = service
            .fetch_and_store(FetchRequest {
                symbol: "aapl".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(summary.success);
        assert_eq!(summary.symbol, "AAPL");
        assert_eq!(summary.total_fetched, 3);
        assert_eq!(summary.new_records, 3);

        let again = service
            .fetch_and_store(FetchRequest {
                symbol: "AAPL".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(again.stock_id, summary.stock_id);
        assert_eq!(again.total_fetched, 3);
        assert_eq!(again.new_records, 0);
    }

    #[tokio::test]
    async fn fetch_honors_explicit_dates() {
        let service = PriceService::new(
            memory_storage().await,
            provider_with("AAPL", &[10.0, 11.0, 12.0, 13.0]),
            2,
        );
        let summary = service
            .fetch_and_store(FetchRequest {
                symbol: "AAPL".into(),
                start: Some(date(1)),
                end: Some(date(2)),
                period: Period::Max,
            })
            .await
            .unwrap();
        assert_eq!(summary.total_fetched, 2);
    }

    #[tokio::test]
    async fn fetch_unknown_symbol_is_invalid_request() {
        let service = PriceService::new(memory_storage().await, provider_with("AAPL", &[1.0]), 2);
        let err = service
            .fetch_and_store(FetchRequest {
                symbol: "ZZZZ".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn fetch_without_data_is_invalid_request() {
        let provider = Arc::new(StubProvider::default().with_stock("EMPTY", "Empty Co", Vec::new()));
        let service = PriceService::new(memory_storage().await, provider, 2);
        let err = service
            .fetch_and_store(FetchRequest {
                symbol: "EMPTY".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn fetch_rejects_inverted_dates() {
        let service = PriceService::new(memory_storage().await, provider_with("AAPL", &[1.0]), 2);
        let err = service
            .fetch_and_store(FetchRequest {
                symbol: "AAPL".into(),
                start: Some(date(5)),
                end: Some(date(1)),
                period: Period::Month1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn prices_by_id_and_symbol_agree() {
        let storage = memory_storage().await;
        let stock = seed(storage.as_ref(), "MSFT", &[1.0, 2.0, 3.0, 4.0]).await;
        let service = PriceService::new(storage, Arc::new(StubProvider::default()), 2);

        let by_id = service.prices(stock.id, DateRange::all(), 2).await.unwrap();
        let by_symbol = service
            .prices_by_symbol("msft", DateRange::all(), 2)
            .await
            .unwrap();
        assert_eq!(by_id, by_symbol);
        let closes: Vec<f64> = by_id.iter().map(|p| p.close_price).collect();
        assert_eq!(closes, vec![3.0, 4.0]);
    }

    #[tokio::test]
    async fn prices_for_missing_stock_is_not_found() {
        let service = PriceService::new(memory_storage().await, Arc::new(StubProvider::default()), 2);
        let err = service.prices(7, DateRange::all(), 10).await.unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stats_are_rounded() {
        let storage = memory_storage().await;
        let stock = seed(storage.as_ref(), "MSFT", &[10.0, 10.5, 11.0, 10.0, 12.123]).await;
        let service = PriceService::new(storage, Arc::new(StubProvider::default()), 2);

        let stats = service.stats(stock.id, DateRange::all()).await.unwrap();
        assert_eq!(stats.symbol, "MSFT");
        assert_eq!(stats.min_price, 10.0);
        assert_eq!(stats.max_price, 12.12);
        assert_eq!(stats.avg_price, 10.72);
        assert_eq!(stats.total_records, 5);
        assert_eq!(stats.date_range_start, date(0));
        assert_eq!(stats.date_range_end, date(4));
    }

    #[tokio::test]
    async fn stats_without_prices_is_no_data() {
        let storage = memory_storage().await;
        let stock = seed(storage.as_ref(), "MSFT", &[]).await;
        let service = PriceService::new(storage, Arc::new(StubProvider::default()), 2);
        let err = service.stats(stock.id, DateRange::all()).await.unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::NoData));
    }

    #[tokio::test]
    async fn stats_within_range() {
        let storage = memory_storage().await;
        let stock = seed(storage.as_ref(), "MSFT", &[10.0, 20.0, 30.0, 40.0]).await;
        let service = PriceService::new(storage, Arc::new(StubProvider::default()), 2);

        let range = DateRange::new(Some(date(1)), Some(date(2))).unwrap();
        let stats = service.stats(stock.id, range).await.unwrap();
        assert_eq!(stats.avg_price, 25.0);
        assert_eq!(stats.total_records, 2);

        let empty = DateRange::new(Some(date(10)), None).unwrap();
        let err = service.stats(stock.id, empty).await.unwrap_err();
        assert!(matches!(err.current_context(), ServiceError::NoData));
    }
}
