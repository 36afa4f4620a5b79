//! Core value types: positions, portfolios, trades.
//!
//! Everything here is a value. Engine operations never mutate a
//! `Portfolio` in place; they return a new one.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Tolerance for monetary and quantity comparisons against zero or against
/// held quantities, absorbing floating-point noise.
pub const EPSILON: f64 = 1e-12;

/// Normalize a ticker: trim whitespace, uppercase.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(Error::InvalidTradeSide(s.to_string())),
        }
    }
}

/// One holding in a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Uppercase, trimmed ticker, unique within a portfolio.
    pub ticker: String,
    /// Free-form classification tag (STOCK, FII, BOND, UNKNOWN, ...).
    pub asset_type: String,
    /// Number of units held, never negative after settlement.
    pub quantity: f64,
    /// Last-known reference price. A fallback only; a supplied price map
    /// is always authoritative.
    pub price: f64,
}

impl Position {
    pub fn new(
        ticker: impl Into<String>,
        asset_type: impl Into<String>,
        quantity: f64,
        price: f64,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            asset_type: asset_type.into(),
            quantity,
            price,
        }
    }

    /// Market value at the given price.
    #[inline]
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }
}

/// A single planned trade. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub ticker: String,
    pub side: Side,
    /// Units traded, always positive.
    pub quantity: f64,
    /// Per-unit execution price, taken from the supplied price map.
    pub price: f64,
}

impl Trade {
    pub fn new(ticker: impl Into<String>, side: Side, quantity: f64, price: f64) -> Self {
        Self {
            ticker: ticker.into(),
            side,
            quantity,
            price,
        }
    }

    /// Monetary size of the trade: quantity × price.
    #[inline]
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }
}

/// An ordered collection of positions (unique by ticker) plus settled cash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub positions: Vec<Position>,
    pub cash: f64,
}

impl Portfolio {
    pub fn new(positions: Vec<Position>, cash: f64) -> Self {
        Self { positions, cash }
    }

    /// Look up a position by ticker.
    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.ticker == ticker)
    }

    /// Ticker → asset type for every held position.
    pub fn asset_types(&self) -> FxHashMap<String, String> {
        self.positions
            .iter()
            .map(|p| (p.ticker.clone(), p.asset_type.clone()))
            .collect()
    }
}
