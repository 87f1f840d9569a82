pub mod sqlite;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::{DateRange, NewStock, PricePoint, Stock, StockPrice, StockUpdate};

/// Pagination and filter for stock listings.
#[derive(Debug, Clone, Copy)]
pub struct StockQuery {
    pub skip: usize,
    pub limit: usize,
    pub active_only: bool,
}

impl Default for StockQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 100,
            active_only: true,
        }
    }
}

/// Durable store for stocks and their price series.
///
/// Symbols are stored upper-case; lookups by symbol are case-insensitive.
pub trait Storage: Send + Sync {
    fn list_stocks(&self, query: StockQuery)
    -> BoxFuture<'_, Result<Vec<Stock>, Report<StorageError>>>;

    /// Case-insensitive substring match on symbol or name.
    fn search_stocks(
        &self,
        query: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Stock>, Report<StorageError>>>;

    fn get_stock(&self, id: i64) -> BoxFuture<'_, Result<Option<Stock>, Report<StorageError>>>;

    fn get_stock_by_symbol(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<Stock>, Report<StorageError>>>;

    fn insert_stock(&self, stock: &NewStock) -> BoxFuture<'_, Result<Stock, Report<StorageError>>>;

    fn update_stock(
        &self,
        id: i64,
        update: &StockUpdate,
    ) -> BoxFuture<'_, Result<Option<Stock>, Report<StorageError>>>;

    /// Delete a stock and all of its prices. Returns `false` if it did not exist.
    fn delete_stock(&self, id: i64) -> BoxFuture<'_, Result<bool, Report<StorageError>>>;

    /// Append price points; dates already stored for the stock are skipped.
    ///
    /// Returns the number of newly stored points.
    fn insert_prices(
        &self,
        stock_id: i64,
        points: &[PricePoint],
    ) -> BoxFuture<'_, Result<usize, Report<StorageError>>>;

    /// Prices in ascending date order. With a `limit`, the most recent
    /// `limit` rows inside `range` are returned.
    fn get_prices(
        &self,
        stock_id: i64,
        range: DateRange,
        limit: Option<usize>,
    ) -> BoxFuture<'_, Result<Vec<StockPrice>, Report<StorageError>>>;
}
