mod dto;
mod error;
mod prices;
mod stocks;

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, extract::FromRef, http::HeaderValue, routing::get};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::provider::MarketDataProvider;
use crate::service::{AnalyticsService, AnalyticsSettings, PriceService, StockService};
use crate::storage::Storage;
use dto::{HealthResponse, RootResponse};

/// Shared state for all handlers; each handler extracts the service it needs.
#[derive(Clone)]
pub struct AppState {
    stocks: StockService,
    prices: PriceService,
    analytics: AnalyticsService,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        provider: Arc<dyn MarketDataProvider>,
        settings: AnalyticsSettings,
    ) -> Self {
        Self {
            stocks: StockService::new(Arc::clone(&storage), Arc::clone(&provider)),
            prices: PriceService::new(
                Arc::clone(&storage),
                provider,
                settings.display_precision,
            ),
            analytics: AnalyticsService::new(storage, settings),
        }
    }
}

impl FromRef<AppState> for StockService {
    fn from_ref(state: &AppState) -> StockService {
        state.stocks.clone()
    }
}

impl FromRef<AppState> for PriceService {
    fn from_ref(state: &AppState) -> PriceService {
        state.prices.clone()
    }
}

impl FromRef<AppState> for AnalyticsService {
    fn from_ref(state: &AppState) -> AnalyticsService {
        state.analytics.clone()
    }
}

/// Build the application router.
///
/// An empty `cors_origins` list allows any origin.
pub fn router(state: AppState, cors_origins: Vec<HeaderValue>) -> Router {
    let origins = if cors_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(cors_origins)
    };
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1/stocks", stocks::router())
        .nest("/api/v1/prices", prices::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Stock Tracker API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}
