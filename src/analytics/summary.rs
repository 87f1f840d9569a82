use chrono::NaiveDate;
use error_stack::{Report, bail};
use serde::Serialize;

use crate::analytics::Analysis;
use crate::error::AnalyticsError;
use crate::model::{DateRange, PriceSeries};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// Min / max / mean / count of closing prices, optionally over a sub-range.
#[derive(Default)]
pub struct Summary {
    range: DateRange,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn within(range: DateRange) -> Self {
        Self { range }
    }
}

impl Analysis for Summary {
    type Output = StatsSummary;

    fn name(&self) -> &str {
        "summary"
    }

    fn required_points(&self) -> usize {
        1
    }

    fn calculate(&self, series: &PriceSeries) -> Result<StatsSummary, Report<AnalyticsError>> {
        let series = series.within(&self.range);
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            bail!(AnalyticsError::EmptySeries);
        };

        let (min, max, sum) = series.points().iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), p| (min.min(p.close), max.max(p.close), sum + p.close),
        );

        Ok(StatsSummary {
            min,
            max,
            mean: sum / series.len() as f64,
            count: series.len(),
            first_date: first.date,
            last_date: last.date,
        })
    }
}
