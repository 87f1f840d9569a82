use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use super::AppState;
use super::dto::{ListStocksQuery, MAX_SKIP, MAX_STOCK_PAGE, SearchQuery, check_bounds};
use super::error::ApiError;
use crate::model::{NewStock, Stock, StockUpdate};
use crate::service::StockService;
use crate::storage::StockQuery;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stocks).post(create_stock))
        .route("/search", get(search_stocks))
        .route("/symbol/{symbol}", get(get_stock_by_symbol))
        .route("/fetch/{symbol}", post(fetch_stock))
        .route(
            "/{stock_id}",
            get(get_stock).put(update_stock).delete(delete_stock),
        )
}

/// GET /api/v1/stocks
async fn list_stocks(
    State(stocks): State<StockService>,
    Query(query): Query<ListStocksQuery>,
) -> Result<Json<Vec<Stock>>, ApiError> {
    check_bounds("limit", query.limit, (1, MAX_STOCK_PAGE))?;
    check_bounds("skip", query.skip, (0, MAX_SKIP))?;
    let stocks = stocks
        .list(StockQuery {
            skip: query.skip,
            limit: query.limit,
            active_only: query.active_only,
        })
        .await?;
    Ok(Json(stocks))
}

/// GET /api/v1/stocks/search?q=
async fn search_stocks(
    State(stocks): State<StockService>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Stock>>, ApiError> {
    Ok(Json(stocks.search(&query.q).await?))
}

async fn get_stock(
    State(stocks): State<StockService>,
    Path(stock_id): Path<i64>,
) -> Result<Json<Stock>, ApiError> {
    Ok(Json(stocks.get(stock_id).await?))
}

async fn get_stock_by_symbol(
    State(stocks): State<StockService>,
    Path(symbol): Path<String>,
) -> Result<Json<Stock>, ApiError> {
    Ok(Json(stocks.get_by_symbol(&symbol).await?))
}

async fn create_stock(
    State(stocks): State<StockService>,
    Json(stock): Json<NewStock>,
) -> Result<(StatusCode, Json<Stock>), ApiError> {
    let created = stocks.create(stock).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /api/v1/stocks/fetch/{symbol} - Track a stock using provider metadata
async fn fetch_stock(
    State(stocks): State<StockService>,
    Path(symbol): Path<String>,
) -> Result<Json<Stock>, ApiError> {
    Ok(Json(stocks.add_from_symbol(&symbol).await?))
}

async fn update_stock(
    State(stocks): State<StockService>,
    Path(stock_id): Path<i64>,
    Json(update): Json<StockUpdate>,
) -> Result<Json<Stock>, ApiError> {
    Ok(Json(stocks.update(stock_id, update).await?))
}

async fn delete_stock(
    State(stocks): State<StockService>,
    Path(stock_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    stocks.delete(stock_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
