use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum ProviderError {
    #[display("request to {provider} failed")]
    Request { provider: String },
    #[display("failed to parse response from {provider}")]
    ResponseParse { provider: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("record already exists")]
    Duplicate,
    #[display("failed to query data")]
    Query,
    #[display("failed to update data")]
    Update,
    #[display("failed to delete data")]
    Delete,
}

/// Local validation failures of the analytics engine.
///
/// All of them are detected before any computation starts and are
/// deterministic for a given input, so callers never retry them.
#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum AnalyticsError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
    #[display("price series is empty")]
    EmptySeries,
    #[display("prior close at index {index} is zero; return is not computable")]
    DivisionByZero { index: usize },
}

#[derive(Debug, Display, Error)]
pub enum ServiceError {
    #[display("{entity} not found")]
    NotFound { entity: String },
    #[display("stock with symbol {symbol} already exists")]
    AlreadyExists { symbol: String },
    #[display("invalid request: {reason}")]
    InvalidRequest { reason: String },
    #[display("no price data found")]
    NoData,
    #[display("insufficient data: {reason}")]
    InsufficientData { reason: String },
    #[display("analytics computation failed")]
    Analytics,
    #[display("market data provider failed")]
    Provider,
    #[display("storage failure")]
    Storage,
}
