//! Error types for the rebalancer.

use std::path::PathBuf;

/// All errors that can occur while planning or settling trades.
///
/// Every failure aborts the whole invocation: there is no partial trade
/// plan and no partial settlement, and nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("mode must be one of: BUY, SELL, TRADE (got {0:?})")]
    InvalidMode(String),

    #[error("missing price for ticker: {0}")]
    MissingPrice(String),

    #[error("price must be > 0 for ticker {ticker} (got {price})")]
    InvalidPrice { ticker: String, price: f64 },

    #[error("cannot SELL {0}: position does not exist")]
    UnknownPosition(String),

    #[error("cannot SELL {ticker}: quantity {requested} exceeds position quantity {held}")]
    Oversell {
        ticker: String,
        requested: f64,
        held: f64,
    },

    #[error("cannot BUY {ticker}: not enough cash (need {needed}, have {available})")]
    InsufficientCash {
        ticker: String,
        needed: f64,
        available: f64,
    },

    #[error("cannot BUY {0}: missing asset type (provide a mapping or a default)")]
    MissingAssetType(String),

    #[error("invalid trade side: {0:?}")]
    InvalidTradeSide(String),

    #[error("ticker appears in multiple asset types: {ticker} ({first} vs {second})")]
    ConflictingAssetType {
        ticker: String,
        first: String,
        second: String,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("loader error: {0}")]
    Loader(String),

    #[error("failed to read {path}: {source}")]
    LoaderRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
