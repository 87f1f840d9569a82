use std::collections::HashSet;
use std::path::Path;

use axum::http::HeaderValue;
use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::analytics::TRADING_DAYS_PER_YEAR;
use crate::error::ConfigError;
use crate::model::Period;
use crate::provider::yahoo::YAHOO_BASE_URL;
use crate::service::AnalyticsSettings;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:8501".into(),
        "http://127.0.0.1:8501".into(),
    ]
}

fn default_provider_name() -> String {
    "yahoo".into()
}

fn default_base_url() -> String {
    YAHOO_BASE_URL.into()
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_periods_per_year() -> u32 {
    TRADING_DAYS_PER_YEAR
}

fn default_display_precision() -> u32 {
    2
}

fn default_period() -> String {
    Period::default().as_str().into()
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Empty allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    /// Origins as header values. Unparseable entries are rejected by `load`.
    pub fn cors_header_values(&self) -> Vec<HeaderValue> {
        self.cors_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: u32,
    /// Decimal places of prices in API responses.
    #[serde(default = "default_display_precision")]
    pub display_precision: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            periods_per_year: default_periods_per_year(),
            display_precision: default_display_precision(),
        }
    }
}

impl AnalyticsConfig {
    pub fn settings(&self) -> AnalyticsSettings {
        AnalyticsSettings {
            periods_per_year: self.periods_per_year,
            display_precision: self.display_precision,
        }
    }
}

/// A symbol whose history is fetched when the server starts.
#[derive(Debug, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    #[serde(default = "default_period")]
    pub period: String,
}

impl SymbolConfig {
    pub fn period(&self) -> Period {
        Period::from_str(&self.period).unwrap_or_default()
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];
const VALID_PROVIDERS: &[&str] = &["yahoo"];
const MAX_DISPLAY_PRECISION: u32 = 10;

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_server(config)?;
    validate_provider(config)?;
    validate_analytics(config)?;
    validate_symbols(config)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let format = config.general.log_format.as_str();
    if !VALID_LOG_FORMATS.contains(&format) {
        return Err(invalid(format!(
            "general.log_format \"{format}\" must be one of {VALID_LOG_FORMATS:?}"
        )));
    }
    Ok(())
}

fn validate_server(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.server.port == 0 {
        return Err(invalid("server.port must be > 0".into()));
    }
    for origin in &config.server.cors_origins {
        if HeaderValue::from_str(origin).is_err() {
            return Err(invalid(format!(
                "server.cors_origins: \"{origin}\" is not a valid header value"
            )));
        }
    }
    Ok(())
}

fn validate_provider(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let provider = &config.provider;
    if !VALID_PROVIDERS.contains(&provider.name.as_str()) {
        return Err(invalid(format!(
            "provider.name \"{}\" is not a known provider",
            provider.name
        )));
    }
    if provider.requests_per_second == 0 {
        return Err(invalid("provider.requests_per_second must be > 0".into()));
    }
    Ok(())
}

fn validate_analytics(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let analytics = &config.analytics;
    if analytics.periods_per_year == 0 {
        return Err(invalid("analytics.periods_per_year must be > 0".into()));
    }
    if analytics.display_precision > MAX_DISPLAY_PRECISION {
        return Err(invalid(format!(
            "analytics.display_precision must be <= {MAX_DISPLAY_PRECISION}"
        )));
    }
    Ok(())
}

fn validate_symbols(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for entry in &config.symbols {
        if Period::from_str(&entry.period).is_none() {
            return Err(invalid(format!(
                "symbols[symbol={}].period: unknown period \"{}\"",
                entry.symbol, entry.period
            )));
        }
        if !seen.insert(entry.symbol.to_uppercase()) {
            return Err(invalid(format!(
                "symbols: duplicate symbol \"{}\"",
                entry.symbol
            )));
        }
    }
    Ok(())
}
