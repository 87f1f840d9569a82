use std::sync::Arc;

use error_stack::{Report, ResultExt, bail};
use tracing::info;

use crate::error::{ServiceError, StorageError};
use crate::model::{NewStock, Stock, StockUpdate};
use crate::provider::MarketDataProvider;
use crate::service::{require_stock, require_stock_by_symbol};
use crate::storage::{StockQuery, Storage};

pub const SEARCH_LIMIT: usize = 20;

const MAX_SYMBOL_LEN: usize = 10;
const MAX_NAME_LEN: usize = 255;
const MAX_CLASSIFICATION_LEN: usize = 100;
const MAX_EXCHANGE_LEN: usize = 50;

#[derive(Clone)]
pub struct StockService {
    storage: Arc<dyn Storage>,
    provider: Arc<dyn MarketDataProvider>,
}

impl StockService {
    pub fn new(storage: Arc<dyn Storage>, provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { storage, provider }
    }

    pub async fn list(&self, query: StockQuery) -> Result<Vec<Stock>, Report<ServiceError>> {
        self.storage
            .list_stocks(query)
            .await
            .change_context(ServiceError::Storage)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Stock>, Report<ServiceError>> {
        let query = query.trim();
        if query.is_empty() {
            bail!(ServiceError::InvalidRequest {
                reason: "search query must not be empty".into(),
            });
        }
        self.storage
            .search_stocks(query, SEARCH_LIMIT)
            .await
            .change_context(ServiceError::Storage)
    }

    pub async fn get(&self, id: i64) -> Result<Stock, Report<ServiceError>> {
        require_stock(self.storage.as_ref(), id).await
    }

    pub async fn get_by_symbol(&self, symbol: &str) -> Result<Stock, Report<ServiceError>> {
        require_stock_by_symbol(self.storage.as_ref(), symbol).await
    }

    pub async fn create(&self, stock: NewStock) -> Result<Stock, Report<ServiceError>> {
        let stock = NewStock {
            symbol: stock.symbol.trim().to_uppercase(),
            ..stock
        };
        validate_new_stock(&stock)?;

        let existing = self
            .storage
            .get_stock_by_symbol(&stock.symbol)
            .await
            .change_context(ServiceError::Storage)?;
        if existing.is_some() {
            bail!(ServiceError::AlreadyExists {
                symbol: stock.symbol,
            });
        }

        // a concurrent create can still win the race to the unique index
        let created = match self.storage.insert_stock(&stock).await {
            Ok(created) => created,
            Err(report) if matches!(report.current_context(), StorageError::Duplicate) => {
                return Err(report.change_context(ServiceError::AlreadyExists {
                    symbol: stock.symbol,
                }));
            }
            Err(report) => return Err(report.change_context(ServiceError::Storage)),
        };
        info!(id = created.id, symbol = %created.symbol, "stock created");
        Ok(created)
    }

    pub async fn update(&self, id: i64, update: StockUpdate) -> Result<Stock, Report<ServiceError>> {
        validate_update(&update)?;
        self.storage
            .update_stock(id, &update)
            .await
            .change_context(ServiceError::Storage)?
            .ok_or_else(|| {
                Report::new(ServiceError::NotFound {
                    entity: format!("stock {id}"),
                })
            })
    }

    pub async fn delete(&self, id: i64) -> Result<(), Report<ServiceError>> {
        let deleted = self
            .storage
            .delete_stock(id)
            .await
            .change_context(ServiceError::Storage)?;
        if !deleted {
            bail!(ServiceError::NotFound {
                entity: format!("stock {id}"),
            });
        }
        info!(id, "stock deleted");
        Ok(())
    }

    /// Return the stored stock for `symbol`, creating it from provider
    /// metadata when it is not tracked yet.
    pub async fn add_from_symbol(&self, symbol: &str) -> Result<Stock, Report<ServiceError>> {
        let symbol = symbol.trim().to_uppercase();
        validate_symbol(&symbol)?;
        if let Some(existing) = self
            .storage
            .get_stock_by_symbol(&symbol)
            .await
            .change_context(ServiceError::Storage)?
        {
            return Ok(existing);
        }

        let info = self
            .provider
            .fetch_stock_info(&symbol)
            .await
            .change_context(ServiceError::Provider)
            .attach_with(|| format!("symbol: {symbol}"))?
            .ok_or_else(|| {
                Report::new(ServiceError::NotFound {
                    entity: format!("symbol {symbol} at {}", self.provider.name()),
                })
            })?;

        self.create(NewStock::from(info)).await
    }
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), Report<ServiceError>> {
    let len = value.chars().count();
    if len < min || len > max {
        bail!(ServiceError::InvalidRequest {
            reason: format!("{field} must be {min}..={max} characters, got {len}"),
        });
    }
    Ok(())
}

fn check_optional(field: &str, value: Option<&str>, max: usize) -> Result<(), Report<ServiceError>> {
    value.map_or(Ok(()), |v| check_len(field, v, 0, max))
}

/// Ticker symbols are short ASCII codes like `AAPL`, `BRK.B` or `^GSPC`.
fn validate_symbol(symbol: &str) -> Result<(), Report<ServiceError>> {
    check_len("symbol", symbol, 1, MAX_SYMBOL_LEN)?;
    let allowed = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if !allowed || !symbol.chars().any(|c| c.is_ascii_alphanumeric()) {
        bail!(ServiceError::InvalidRequest {
            reason: format!("invalid symbol {symbol:?}"),
        });
    }
    Ok(())
}

fn validate_new_stock(stock: &NewStock) -> Result<(), Report<ServiceError>> {
    validate_symbol(&stock.symbol)?;
    check_len("name", &stock.name, 1, MAX_NAME_LEN)?;
    check_optional("sector", stock.sector.as_deref(), MAX_CLASSIFICATION_LEN)?;
    check_optional("industry", stock.industry.as_deref(), MAX_CLASSIFICATION_LEN)?;
    check_optional("exchange", stock.exchange.as_deref(), MAX_EXCHANGE_LEN)
}

fn validate_update(update: &StockUpdate) -> Result<(), Report<ServiceError>> {
    if let Some(name) = &update.name {
        check_len("name", name, 1, MAX_NAME_LEN)?;
    }
    check_optional("sector", update.sector.as_deref(), MAX_CLASSIFICATION_LEN)?;
    check_optional("industry", update.industry.as_deref(), MAX_CLASSIFICATION_LEN)?;
    check_optional("exchange", update.exchange.as_deref(), MAX_EXCHANGE_LEN)
}
