// Core structs: Sample, PriceQuote, CycleResult and the error types shared across modules
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Wildberries article number (`nm` query parameter).
pub type ProductId = u64;
/// Value of the `spp` query parameter.
pub type Spp = u32;
/// Value of the `dest` query parameter. Region codes can be negative.
pub type Dest = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    RateLimited,
    NotFound,
    Malformed,
    NetworkError,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::RateLimited => "rate_limited",
            Outcome::NotFound => "not_found",
            Outcome::Malformed => "malformed",
            Outcome::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price fields extracted from a product card.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub basic: u64,
    pub product: u64,
    pub qty: u64,
}

impl PriceQuote {
    /// Discount of `product` relative to `basic`, in percent with two decimals.
    pub fn discount_pct(&self) -> f64 {
        if self.basic == 0 {
            return 0.0;
        }
        let pct = 100.0 - (self.product as f64 / self.basic as f64 * 100.0);
        (pct * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub product_id: ProductId,
    pub spp: Spp,
    pub dest: Dest,
    pub outcome: Outcome,
    pub price: Option<PriceQuote>,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn from_fetch(
        product_id: ProductId,
        spp: Spp,
        dest: Dest,
        result: &Result<PriceQuote, FetchError>,
    ) -> Self {
        let (outcome, price) = match result {
            Ok(quote) => (Outcome::Success, Some(*quote)),
            Err(e) => (e.outcome(), None),
        };
        Self {
            product_id,
            spp,
            dest,
            outcome,
            price,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub avg_price: f64,
    pub std_dev: f64,
    /// Mean of [`PriceQuote::discount_pct`] over the priced samples.
    pub avg_discount_pct: f64,
}

/// Frozen outcome of one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: DateTime<Utc>,
    pub best_spp: Spp,
    pub best_dest: Dest,
    pub sample_count: u64,
    pub success_rate: f64,
    pub outcome_counts: BTreeMap<Outcome, u64>,
    pub price_stats: Option<PriceStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone)]
pub struct CycleStatus {
    pub state: SchedulerState,
    pub last_result: Option<std::sync::Arc<CycleResult>>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("product not found")]
    NotFound,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
}

impl FetchError {
    /// Maps a failed fetch onto the sample outcome it is recorded as.
    pub fn outcome(&self) -> Outcome {
        match self {
            FetchError::Network(_) => Outcome::NetworkError,
            FetchError::RateLimited => Outcome::RateLimited,
            FetchError::NotFound => Outcome::NotFound,
            FetchError::Malformed(_) => Outcome::Malformed,
            FetchError::UnexpectedStatus(status) if *status >= 500 => Outcome::NetworkError,
            FetchError::UnexpectedStatus(_) => Outcome::Malformed,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.outcome(), Outcome::NetworkError | Outcome::RateLimited)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParserError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("product {0} not present in response")]
    ProductAbsent(ProductId),
}

impl From<ParserError> for FetchError {
    fn from(e: ParserError) -> Self {
        match e {
            ParserError::ProductAbsent(_) => FetchError::NotFound,
            other => FetchError::Malformed(other.to_string()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("no successful samples in this cycle")]
    NoData,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("no completed cycle result is available yet")]
    NoDataAvailable,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a cycle is already running")]
    AlreadyRunning,
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("cycle produced no usable data")]
    NoData(#[from] AnalysisError),
    #[error("cycle was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram API error: {0}")]
    ApiError(String),
    #[error("telegram unreachable")]
    Unreachable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_is_rounded_to_two_decimals() {
        let quote = PriceQuote { basic: 300_000, product: 199_900, qty: 1 };
        assert_eq!(quote.discount_pct(), 33.37);
    }

    #[test]
    fn discount_of_zero_basic_price_is_zero() {
        let quote = PriceQuote { basic: 0, product: 100, qty: 0 };
        assert_eq!(quote.discount_pct(), 0.0);
    }

    #[test]
    fn server_errors_are_transient_but_client_errors_are_not() {
        assert!(FetchError::UnexpectedStatus(503).is_transient());
        assert_eq!(FetchError::UnexpectedStatus(403).outcome(), Outcome::Malformed);
        assert!(!FetchError::NotFound.is_transient());
        assert!(FetchError::RateLimited.is_transient());
        assert!(FetchError::Network("reset".into()).is_transient());
    }

    #[test]
    fn absent_product_is_classified_as_not_found() {
        let err: FetchError = ParserError::ProductAbsent(7).into();
        assert!(matches!(err, FetchError::NotFound));
        let err: FetchError = ParserError::MissingField("sizes".into()).into();
        assert!(matches!(err, FetchError::Malformed(_)));
    }
}
