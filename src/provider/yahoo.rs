use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::model::{PricePoint, StockInfo};
use crate::provider::{HistoryRequest, MarketDataProvider};

pub const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
const PROVIDER: &str = "yahoo";
const REQUEST_TIMEOUT_SECS: u64 = 10;
/// Yahoo rejects requests without a browser-like user agent.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";
const DEFAULT_REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(5u32);

pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl YahooProvider {
    pub fn new(base_url: &str, requests_per_second: u32) -> Result<Self, Report<ProviderError>> {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_REQUESTS_PER_SECOND);
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .change_context(ProviderError::Request {
                provider: PROVIDER.into(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            urlencoding::encode(symbol)
        )
    }

    /// GET the chart endpoint. `None` when Yahoo answers 404 (unknown symbol).
    async fn fetch_chart(
        &self,
        symbol: &str,
        params: &[(String, String)],
    ) -> Result<Option<ChartResult>, Report<ProviderError>> {
        self.rate_limiter.until_ready().await;

        let url = self.chart_url(symbol);
        debug!(%url, ?params, "requesting yahoo chart");

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .change_context(ProviderError::Request {
                provider: PROVIDER.into(),
            })
            .attach_with(|| format!("symbol: {symbol}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(symbol, "yahoo does not know symbol");
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(Report::new(ProviderError::Request {
                provider: PROVIDER.into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        let chart: ChartResponse =
            response
                .json()
                .await
                .change_context(ProviderError::ResponseParse {
                    provider: PROVIDER.into(),
                })?;

        chart.into_result()
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn fetch_stock_info(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<StockInfo>, Report<ProviderError>>> {
        let symbol = symbol.to_uppercase();
        Box::pin(async move {
            let params = [
                ("range".to_owned(), "1d".to_owned()),
                ("interval".to_owned(), "1d".to_owned()),
            ];
            let info = self
                .fetch_chart(&symbol, &params)
                .await?
                .and_then(|chart| chart.meta.into_stock_info(&symbol));

            if info.is_none() {
                warn!(symbol = %symbol, "no stock info from yahoo");
            }
            Ok(info)
        })
    }

    fn fetch_history(
        &self,
        symbol: &str,
        request: HistoryRequest,
    ) -> BoxFuture<'_, Result<Vec<PricePoint>, Report<ProviderError>>> {
        let symbol = symbol.to_uppercase();
        Box::pin(async move {
            let params = history_params(&request);
            let Some(chart) = self.fetch_chart(&symbol, &params).await? else {
                return Ok(Vec::new());
            };

            let points = chart.into_points();
            info!(
                symbol = %symbol,
                period = %request.period,
                fetched = points.len(),
                "yahoo history fetched"
            );
            Ok(points)
        })
    }
}

fn history_params(request: &HistoryRequest) -> Vec<(String, String)> {
    let mut params = vec![("interval".to_owned(), "1d".to_owned())];
    match (request.start, request.end) {
        (Some(start), Some(end)) => {
            // period2 is exclusive on Yahoo's side
            params.push(("period1".to_owned(), unix_midnight(start).to_string()));
            params.push((
                "period2".to_owned(),
                unix_midnight(end.succ_opt().unwrap_or(end)).to_string(),
            ));
        }
        _ => params.push(("range".to_owned(), request.period.as_str().to_owned())),
    }
    params
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    long_name: Option<String>,
    short_name: Option<String>,
    exchange_name: Option<String>,
    full_exchange_name: Option<String>,
    regular_market_price: Option<f64>,
    /// Seconds east of UTC for the listing exchange.
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl ChartResponse {
    fn into_result(self) -> Result<Option<ChartResult>, Report<ProviderError>> {
        if let Some(error) = self.chart.error {
            return Err(Report::new(ProviderError::Request {
                provider: PROVIDER.into(),
            })
            .attach(format!("{}: {}", error.code, error.description)));
        }
        Ok(self.chart.result.and_then(|r| r.into_iter().next()))
    }
}

impl ChartMeta {
    fn into_stock_info(self, symbol: &str) -> Option<StockInfo> {
        self.regular_market_price?;
        Some(StockInfo {
            symbol: symbol.to_uppercase(),
            name: self
                .long_name
                .or(self.short_name)
                .unwrap_or_else(|| symbol.to_uppercase()),
            sector: None,
            industry: None,
            exchange: self.exchange_name.or(self.full_exchange_name),
        })
    }
}

impl ChartResult {
    /// Daily bars keyed by exchange-local date.
    ///
    /// Rows missing any OHLC value or with a non-positive close are dropped.
    /// Yahoo may append a live bar sharing the last session's date; the
    /// later row wins.
    fn into_points(self) -> Vec<PricePoint> {
        let offset = self.meta.gmtoffset;
        let quote = self.indicators.quote.into_iter().next().unwrap_or_default();

        let mut by_date: BTreeMap<NaiveDate, PricePoint> = BTreeMap::new();
        for (i, &ts) in self.timestamp.iter().enumerate() {
            let (Some(Some(open)), Some(Some(high)), Some(Some(low)), Some(Some(close))) = (
                quote.open.get(i),
                quote.high.get(i),
                quote.low.get(i),
                quote.close.get(i),
            ) else {
                continue;
            };
            if *close <= 0.0 {
                continue;
            }
            let Some(local) = DateTime::from_timestamp(ts + offset, 0) else {
                continue;
            };
            let volume = quote.volume.get(i).copied().flatten().unwrap_or(0.0);

            let date = local.date_naive();
            by_date.insert(
                date,
                PricePoint {
                    date,
                    open: *open,
                    high: *high,
                    low: *low,
                    close: *close,
                    volume: volume.max(0.0) as u64,
                },
            );
        }

        by_date.into_values().collect()
    }
}
