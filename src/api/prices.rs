use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};

use super::AppState;
use super::dto::{
    DAYS_AHEAD_BOUNDS, FetchPricesRequest, MAX_PRICE_PAGE, MovingAverageQuery,
    PROJECTION_LOOKBACK_BOUNDS, PriceQuery, ProjectionQuery, StatsQuery, VOLATILITY_LOOKBACK_BOUNDS,
    VolatilityQuery, WINDOW_BOUNDS, check_bounds, date_range,
};
use super::error::ApiError;
use crate::model::StockPrice;
use crate::service::AnalyticsService;
use crate::service::PriceService;
use crate::service::analytics::{MovingAverageEntry, ProjectionReport, VolatilityReport};
use crate::service::prices::{FetchRequest, FetchSummary, PriceStats};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/fetch", post(fetch_prices))
        .route("/symbol/{symbol}", get(get_prices_by_symbol))
        .route("/{stock_id}", get(get_prices))
        .route("/{stock_id}/stats", get(get_stats))
        .route("/{stock_id}/moving-average", get(get_moving_average))
        .route("/{stock_id}/projection", get(get_projection))
        .route("/{stock_id}/volatility", get(get_volatility))
}

/// GET /api/v1/prices/{stock_id}
async fn get_prices(
    State(prices): State<PriceService>,
    Path(stock_id): Path<i64>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<Vec<StockPrice>>, ApiError> {
    check_bounds("limit", query.limit, (1, MAX_PRICE_PAGE))?;
    let range = date_range(query.start_date, query.end_date)?;
    Ok(Json(prices.prices(stock_id, range, query.limit).await?))
}

async fn get_prices_by_symbol(
    State(prices): State<PriceService>,
    Path(symbol): Path<String>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<Vec<StockPrice>>, ApiError> {
    check_bounds("limit", query.limit, (1, MAX_PRICE_PAGE))?;
    let range = date_range(query.start_date, query.end_date)?;
    Ok(Json(
        prices
            .prices_by_symbol(&symbol, range, query.limit)
            .await?,
    ))
}

/// POST /api/v1/prices/fetch - Pull history from the provider and store it
async fn fetch_prices(
    State(prices): State<PriceService>,
    Json(request): Json<FetchPricesRequest>,
) -> Result<Json<FetchSummary>, ApiError> {
    let period = request.period()?;
    let summary = prices
        .fetch_and_store(FetchRequest {
            symbol: request.symbol,
            start: request.start_date,
            end: request.end_date,
            period,
        })
        .await?;
    Ok(Json(summary))
}

async fn get_stats(
    State(prices): State<PriceService>,
    Path(stock_id): Path<i64>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<PriceStats>, ApiError> {
    let range = date_range(query.start_date, query.end_date)?;
    Ok(Json(prices.stats(stock_id, range).await?))
}

async fn get_moving_average(
    State(analytics): State<AnalyticsService>,
    Path(stock_id): Path<i64>,
    Query(query): Query<MovingAverageQuery>,
) -> Result<Json<Vec<MovingAverageEntry>>, ApiError> {
    check_bounds("window", query.window, WINDOW_BOUNDS)?;
    let range = date_range(query.start_date, query.end_date)?;
    Ok(Json(
        analytics
            .moving_average(stock_id, query.window, range)
            .await?,
    ))
}

async fn get_projection(
    State(analytics): State<AnalyticsService>,
    Path(stock_id): Path<i64>,
    Query(query): Query<ProjectionQuery>,
) -> Result<Json<ProjectionReport>, ApiError> {
    check_bounds("days_ahead", query.days_ahead, DAYS_AHEAD_BOUNDS)?;
    check_bounds("lookback_days", query.lookback_days, PROJECTION_LOOKBACK_BOUNDS)?;
    Ok(Json(
        analytics
            .projection(stock_id, query.days_ahead, query.lookback_days)
            .await?,
    ))
}

async fn get_volatility(
    State(analytics): State<AnalyticsService>,
    Path(stock_id): Path<i64>,
    Query(query): Query<VolatilityQuery>,
) -> Result<Json<VolatilityReport>, ApiError> {
    check_bounds("lookback_days", query.lookback_days, VOLATILITY_LOOKBACK_BOUNDS)?;
    Ok(Json(
        analytics
            .volatility(stock_id, query.lookback_days)
            .await?,
    ))
}
