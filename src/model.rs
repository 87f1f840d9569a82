use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use error_stack::{Report, bail};
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

/// Lookback keyword accepted by the market data provider.
///
/// String representations match the provider and the API format (e.g. `"1mo"`, `"ytd"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    Day1,
    Day5,
    #[default]
    Month1,
    Month3,
    Month6,
    Year1,
    Year2,
    Year5,
    Year10,
    YearToDate,
    Max,
}

impl Period {
    /// Parse an API/config-format string into a `Period`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1d" => Some(Self::Day1),
            "5d" => Some(Self::Day5),
            "1mo" => Some(Self::Month1),
            "3mo" => Some(Self::Month3),
            "6mo" => Some(Self::Month6),
            "1y" => Some(Self::Year1),
            "2y" => Some(Self::Year2),
            "5y" => Some(Self::Year5),
            "10y" => Some(Self::Year10),
            "ytd" => Some(Self::YearToDate),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day1 => "1d",
            Self::Day5 => "5d",
            Self::Month1 => "1mo",
            Self::Month3 => "3mo",
            Self::Month6 => "6mo",
            Self::Year1 => "1y",
            Self::Year2 => "2y",
            Self::Year5 => "5y",
            Self::Year10 => "10y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive date bounds; a missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self, Report<AnalyticsError>> {
        if let (Some(s), Some(e)) = (start, end)
            && s > e
        {
            bail!(AnalyticsError::InvalidParameter {
                name: format!("start date {s} is after end date {e}"),
            });
        }
        Ok(Self { start, end })
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// One daily bar of a stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Price history of one stock, ascending by date.
///
/// Dates are strictly increasing. The series is never mutated in place;
/// [`PriceSeries::within`] produces a truncated copy.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    stock_id: i64,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(stock_id: i64, points: Vec<PricePoint>) -> Result<Self, Report<AnalyticsError>> {
        if let Some(pos) = points.windows(2).position(|w| w[0].date >= w[1].date) {
            bail!(AnalyticsError::InvalidParameter {
                name: format!(
                    "series dates must be strictly increasing ({} then {})",
                    points[pos].date,
                    points[pos + 1].date
                ),
            });
        }
        Ok(Self { stock_id, points })
    }

    pub fn stock_id(&self) -> i64 {
        self.stock_id
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Points falling inside `range`, as a new series.
    pub fn within(&self, range: &DateRange) -> PriceSeries {
        PriceSeries {
            stock_id: self.stock_id,
            points: self
                .points
                .iter()
                .filter(|p| range.contains(p.date))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stock {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub exchange: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewStock {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StockUpdate {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub exchange: Option<String>,
    pub is_active: Option<bool>,
}

/// Stock metadata as reported by the market data provider.
#[derive(Debug, Clone, PartialEq)]
pub struct StockInfo {
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub exchange: Option<String>,
}

impl From<StockInfo> for NewStock {
    fn from(info: StockInfo) -> Self {
        Self {
            symbol: info.symbol,
            name: info.name,
            sector: info.sector,
            industry: info.industry,
            exchange: info.exchange,
        }
    }
}

/// A stored price row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockPrice {
    pub id: i64,
    pub stock_id: i64,
    pub date: NaiveDate,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: u64,
    pub created_at: DateTime<Utc>,
}

impl StockPrice {
    pub fn point(&self) -> PricePoint {
        PricePoint {
            date: self.date,
            open: self.open_price,
            high: self.high_price,
            low: self.low_price,
            close: self.close_price,
            volume: self.volume,
        }
    }
}

/// Build a series from stored rows (which the store returns ascending).
pub fn series_from_rows(
    stock_id: i64,
    rows: &[StockPrice],
) -> Result<PriceSeries, Report<AnalyticsError>> {
    PriceSeries::new(stock_id, rows.iter().map(StockPrice::point).collect())
}
