use chrono::{DateTime, NaiveDate, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;
use crate::model::{DateRange, NewStock, PricePoint, Stock, StockPrice, StockUpdate};
use crate::storage::{StockQuery, Storage};

type StockRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

type PriceRow = (
    i64,
    i64,
    NaiveDate,
    f64,
    f64,
    f64,
    f64,
    i64,
    DateTime<Utc>,
);

const STOCK_COLUMNS: &str =
    "id, symbol, name, sector, industry, exchange, is_active, created_at, updated_at";

const PRICE_COLUMNS: &str =
    "id, stock_id, date, open_price, high_price, low_price, close_price, volume, created_at";

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        Self::migrate(pool).await
    }

    /// Single-connection in-memory database; every connection to
    /// `sqlite::memory:` is a separate database, so the pool is capped at one.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, Report<StorageError>> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .change_context(StorageError::Migration)?
            .foreign_keys(true);

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .change_context(StorageError::Migration)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, Report<StorageError>> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

impl Storage for SqliteStorage {
    fn list_stocks(
        &self,
        query: StockQuery,
    ) -> BoxFuture<'_, Result<Vec<Stock>, Report<StorageError>>> {
        Box::pin(async move {
            let skip = i64::try_from(query.skip)
                .change_context(StorageError::Query)
                .attach_with(|| format!("skip out of range: {}", query.skip))?;
            let rows: Vec<StockRow> = sqlx::query_as(&format!(
                "SELECT {STOCK_COLUMNS} FROM stocks \
                 WHERE (? = 0 OR is_active = 1) \
                 ORDER BY id ASC \
                 LIMIT ? OFFSET ?"
            ))
            .bind(query.active_only)
            .bind(query.limit as i64)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            Ok(rows.into_iter().map(map_stock_row).collect())
        })
    }

    fn search_stocks(
        &self,
        query: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Stock>, Report<StorageError>>> {
        let pattern = format!("%{}%", escape_like(query));
        Box::pin(async move {
            let rows: Vec<StockRow> = sqlx::query_as(&format!(
                "SELECT {STOCK_COLUMNS} FROM stocks \
                 WHERE symbol LIKE ?1 ESCAPE '\\' OR name LIKE ?1 ESCAPE '\\' \
                 ORDER BY symbol ASC \
                 LIMIT ?2"
            ))
            .bind(&pattern)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)
            .attach_with(|| format!("pattern: {pattern}"))?;

            Ok(rows.into_iter().map(map_stock_row).collect())
        })
    }

    fn get_stock(&self, id: i64) -> BoxFuture<'_, Result<Option<Stock>, Report<StorageError>>> {
        Box::pin(async move {
            let row: Option<StockRow> =
                sqlx::query_as(&format!("SELECT {STOCK_COLUMNS} FROM stocks WHERE id = ?"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .change_context(StorageError::Query)?;

            Ok(row.map(map_stock_row))
        })
    }

    fn get_stock_by_symbol(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<Stock>, Report<StorageError>>> {
        let symbol = symbol.to_uppercase();
        Box::pin(async move {
            let row: Option<StockRow> =
                sqlx::query_as(&format!("SELECT {STOCK_COLUMNS} FROM stocks WHERE symbol = ?"))
                    .bind(&symbol)
                    .fetch_optional(&self.pool)
                    .await
                    .change_context(StorageError::Query)?;

            Ok(row.map(map_stock_row))
        })
    }

    fn insert_stock(&self, stock: &NewStock) -> BoxFuture<'_, Result<Stock, Report<StorageError>>> {
        let stock = stock.clone();
        Box::pin(async move {
            let now = Utc::now();
            let row: StockRow = sqlx::query_as(&format!(
                "INSERT INTO stocks \
                 (symbol, name, sector, industry, exchange, is_active, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, 1, ?, ?) \
                 RETURNING {STOCK_COLUMNS}"
            ))
            .bind(stock.symbol.to_uppercase())
            .bind(&stock.name)
            .bind(&stock.sector)
            .bind(&stock.industry)
            .bind(&stock.exchange)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                let context = match &err {
                    sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Duplicate,
                    _ => StorageError::Insert,
                };
                Report::new(err).change_context(context)
            })
            .attach_with(|| format!("symbol: {}", stock.symbol))?;

            Ok(map_stock_row(row))
        })
    }

    fn update_stock(
        &self,
        id: i64,
        update: &StockUpdate,
    ) -> BoxFuture<'_, Result<Option<Stock>, Report<StorageError>>> {
        let update = update.clone();
        Box::pin(async move {
            let row: Option<StockRow> = sqlx::query_as(&format!(
                "UPDATE stocks SET \
                 name = COALESCE(?, name), \
                 sector = COALESCE(?, sector), \
                 industry = COALESCE(?, industry), \
                 exchange = COALESCE(?, exchange), \
                 is_active = COALESCE(?, is_active), \
                 updated_at = ? \
                 WHERE id = ? \
                 RETURNING {STOCK_COLUMNS}"
            ))
            .bind(&update.name)
            .bind(&update.sector)
            .bind(&update.industry)
            .bind(&update.exchange)
            .bind(update.is_active)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .change_context(StorageError::Update)
            .attach_with(|| format!("stock_id: {id}"))?;

            Ok(row.map(map_stock_row))
        })
    }

    fn delete_stock(&self, id: i64) -> BoxFuture<'_, Result<bool, Report<StorageError>>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .change_context(StorageError::Delete)?;

            sqlx::query("DELETE FROM stock_prices WHERE stock_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Delete)?;

            let deleted = sqlx::query("DELETE FROM stocks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Delete)?
                .rows_affected();

            tx.commit().await.change_context(StorageError::Delete)?;
            Ok(deleted > 0)
        })
    }

    fn insert_prices(
        &self,
        stock_id: i64,
        points: &[PricePoint],
    ) -> BoxFuture<'_, Result<usize, Report<StorageError>>> {
        let points = points.to_vec();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .change_context(StorageError::Insert)?;

            let now = Utc::now();
            let mut created = 0u64;
            for p in &points {
                // Stored prices are immutable: an existing (stock_id, date) wins.
                created += sqlx::query(
                    "INSERT OR IGNORE INTO stock_prices \
                     (stock_id, date, open_price, high_price, low_price, close_price, volume, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(stock_id)
                .bind(p.date)
                .bind(p.open)
                .bind(p.high)
                .bind(p.low)
                .bind(p.close)
                .bind(i64::try_from(p.volume).unwrap_or(i64::MAX))
                .bind(now)
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Insert)
                .attach_with(|| format!("stock_id: {stock_id}, date: {}", p.date))?
                .rows_affected();
            }

            tx.commit().await.change_context(StorageError::Insert)?;
            Ok(created as usize)
        })
    }

    fn get_prices(
        &self,
        stock_id: i64,
        range: DateRange,
        limit: Option<usize>,
    ) -> BoxFuture<'_, Result<Vec<StockPrice>, Report<StorageError>>> {
        Box::pin(async move {
            // SQLite treats a negative LIMIT as "no limit".
            let limit = limit.map_or(-1, |l| l as i64);
            let rows: Vec<PriceRow> = sqlx::query_as(&format!(
                "SELECT {PRICE_COLUMNS} FROM stock_prices \
                 WHERE stock_id = ?1 \
                 AND (?2 IS NULL OR date >= ?2) \
                 AND (?3 IS NULL OR date <= ?3) \
                 ORDER BY date DESC \
                 LIMIT ?4"
            ))
            .bind(stock_id)
            .bind(range.start)
            .bind(range.end)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)
            .attach_with(|| format!("stock_id: {stock_id}"))?;

            let mut prices: Vec<StockPrice> = rows.into_iter().map(map_price_row).collect();

            // Return in ascending chronological order (oldest first)
            prices.reverse();
            Ok(prices)
        })
    }
}

fn map_stock_row(
    (id, symbol, name, sector, industry, exchange, is_active, created_at, updated_at): StockRow,
) -> Stock {
    Stock {
        id,
        symbol,
        name,
        sector,
        industry,
        exchange,
        is_active,
        created_at,
        updated_at,
    }
}

fn map_price_row(
    (id, stock_id, date, open, high, low, close, volume, created_at): PriceRow,
) -> StockPrice {
    StockPrice {
        id,
        stock_id,
        date,
        open_price: open,
        high_price: high,
        low_price: low,
        close_price: close,
        volume: volume.max(0) as u64,
        created_at,
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{date, point};

    fn new_stock(symbol: &str, name: &str) -> NewStock {
        NewStock {
            symbol: symbol.into(),
            name: name.into(),
            sector: Some("Technology".into()),
            industry: None,
            exchange: Some("NMS".into()),
        }
    }

    #[tokio::test]
    async fn insert_and_lookup_stock() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let created = storage
            .insert_stock(&new_stock("aapl", "Apple Inc."))
            .await
            .unwrap();
        assert_eq!(created.symbol, "AAPL");
        assert!(created.is_active);

        let by_id = storage.get_stock(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.symbol, "AAPL");
        assert_eq!(by_id.name, "Apple Inc.");
        assert_eq!(by_id.exchange.as_deref(), Some("NMS"));

        let by_symbol = storage.get_stock_by_symbol("aApL").await.unwrap().unwrap();
        assert_eq!(by_symbol.id, created.id);

        assert!(storage.get_stock(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_symbol_rejected() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage.insert_stock(&new_stock("MSFT", "Microsoft")).await.unwrap();
        let err = storage
            .insert_stock(&new_stock("msft", "Again"))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), StorageError::Duplicate));
    }

    #[tokio::test]
    async fn list_filters_inactive_and_paginates() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let a = storage.insert_stock(&new_stock("AAA", "A")).await.unwrap();
        storage.insert_stock(&new_stock("BBB", "B")).await.unwrap();
        storage.insert_stock(&new_stock("CCC", "C")).await.unwrap();
        storage
            .update_stock(
                a.id,
                &StockUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let active = storage.list_stocks(StockQuery::default()).await.unwrap();
        assert_eq!(active.len(), 2);

        let all = storage
            .list_stocks(StockQuery {
                active_only: false,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let page = storage
            .list_stocks(StockQuery {
                skip: 1,
                limit: 1,
                active_only: false,
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].symbol, "BBB");

        let overflow = storage
            .list_stocks(StockQuery {
                skip: usize::MAX,
                limit: 1,
                active_only: false,
            })
            .await;
        assert!(overflow.is_err());
    }

    #[tokio::test]
    async fn search_matches_symbol_or_name_case_insensitively() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage.insert_stock(&new_stock("AAPL", "Apple Inc.")).await.unwrap();
        storage.insert_stock(&new_stock("GOOGL", "Alphabet Inc.")).await.unwrap();
        storage.insert_stock(&new_stock("PINE", "Pineapple Co")).await.unwrap();

        let hits = storage.search_stocks("apple", 20).await.unwrap();
        let symbols: Vec<&str> = hits.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "PINE"]);

        let hits = storage.search_stocks("googl", 20).await.unwrap();
        assert_eq!(hits.len(), 1);

        // Wildcards in the query are literal
        assert!(storage.search_stocks("%", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_update_keeps_untouched_columns() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let created = storage.insert_stock(&new_stock("IBM", "IBM")).await.unwrap();

        let updated = storage
            .update_stock(
                created.id,
                &StockUpdate {
                    name: Some("International Business Machines".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "International Business Machines");
        assert_eq!(updated.sector.as_deref(), Some("Technology"));
        assert!(updated.updated_at >= created.updated_at);

        let missing = storage
            .update_stock(9999, &StockUpdate::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn insert_prices_skips_existing_dates() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let stock = storage.insert_stock(&new_stock("AAPL", "Apple")).await.unwrap();

        let created = storage
            .insert_prices(stock.id, &[point(0, 100.0), point(1, 101.0)])
            .await
            .unwrap();
        assert_eq!(created, 2);

        // Same date with a different close must not overwrite the stored row
        let created = storage
            .insert_prices(stock.id, &[point(1, 999.0), point(2, 102.0)])
            .await
            .unwrap();
        assert_eq!(created, 1);

        let prices = storage
            .get_prices(stock.id, DateRange::all(), None)
            .await
            .unwrap();
        let closes: Vec<f64> = prices.iter().map(|p| p.close_price).collect();
        assert_eq!(closes, vec![100.0, 101.0, 102.0]);
    }

    #[tokio::test]
    async fn get_prices_respects_range_and_keeps_most_recent_under_limit() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let stock = storage.insert_stock(&new_stock("AAPL", "Apple")).await.unwrap();
        let points: Vec<PricePoint> = (0..10).map(|i| point(i, 100.0 + i as f64)).collect();
        storage.insert_prices(stock.id, &points).await.unwrap();

        let range = DateRange::new(Some(date(2)), Some(date(6))).unwrap();
        let ranged = storage.get_prices(stock.id, range, None).await.unwrap();
        assert_eq!(ranged.len(), 5);
        assert_eq!(ranged[0].date, date(2));
        assert_eq!(ranged[4].date, date(6));

        let recent = storage
            .get_prices(stock.id, DateRange::all(), Some(3))
            .await
            .unwrap();
        let dates: Vec<NaiveDate> = recent.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![date(7), date(8), date(9)]);
    }

    #[tokio::test]
    async fn delete_stock_removes_prices() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let stock = storage.insert_stock(&new_stock("AAPL", "Apple")).await.unwrap();
        storage
            .insert_prices(stock.id, &[point(0, 100.0)])
            .await
            .unwrap();

        assert!(storage.delete_stock(stock.id).await.unwrap());
        assert!(!storage.delete_stock(stock.id).await.unwrap());

        let prices = storage
            .get_prices(stock.id, DateRange::all(), None)
            .await
            .unwrap();
        assert!(prices.is_empty());
    }
}
