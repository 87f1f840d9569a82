pub mod moving_average;
pub mod projection;
pub mod summary;
pub mod volatility;

use error_stack::Report;

use crate::error::AnalyticsError;
use crate::model::PriceSeries;

/// Trading days per year used to annualize daily volatility.
pub const TRADING_DAYS_PER_YEAR: u32 = 252;

/// A pure computation over a price series.
///
/// Implementations never perform I/O and hold no state besides their
/// parameters, so the same input always produces the same output.
pub trait Analysis {
    type Output;

    /// Unique name of this analysis (e.g., "moving_average").
    fn name(&self) -> &str;

    /// Minimum number of points required to produce a result.
    fn required_points(&self) -> usize;

    /// Run the analysis. Parameters are validated before any computation.
    fn calculate(&self, series: &PriceSeries) -> Result<Self::Output, Report<AnalyticsError>>;
}

/// Extract close prices from a series.
pub fn close_prices(series: &PriceSeries) -> Vec<f64> {
    series.points().iter().map(|p| p.close).collect()
}

/// Round `value` to `places` decimal places for display.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
