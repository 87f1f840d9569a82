pub mod analytics;
pub mod prices;
pub mod stocks;

use error_stack::{Report, ResultExt};

use crate::error::ServiceError;
use crate::model::Stock;
use crate::storage::Storage;

pub use analytics::{AnalyticsService, AnalyticsSettings};
pub use prices::PriceService;
pub use stocks::StockService;

/// Look up a stock by id, mapping absence to `NotFound`.
async fn require_stock(storage: &dyn Storage, id: i64) -> Result<Stock, Report<ServiceError>> {
    storage
        .get_stock(id)
        .await
        .change_context(ServiceError::Storage)?
        .ok_or_else(|| {
            Report::new(ServiceError::NotFound {
                entity: format!("stock {id}"),
            })
        })
}

async fn require_stock_by_symbol(
    storage: &dyn Storage,
    symbol: &str,
) -> Result<Stock, Report<ServiceError>> {
    storage
        .get_stock_by_symbol(symbol)
        .await
        .change_context(ServiceError::Storage)?
        .ok_or_else(|| {
            Report::new(ServiceError::NotFound {
                entity: format!("stock {}", symbol.to_uppercase()),
            })
        })
}
