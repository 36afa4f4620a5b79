//! Target allocations: desired fractional weight per ticker.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Position, normalize_ticker};

/// Desired fractional weight per ticker.
///
/// Lookup of an absent ticker yields 0.0, never an error. Weights are not
/// required to sum to 1; whatever total weight is given scales against the
/// total portfolio value, and any shortfall is implicitly left in cash.
/// The type performs no normalization — callers normalize tickers and
/// weights before constructing it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetAllocation {
    pub weights_by_ticker: FxHashMap<String, f64>,
}

impl TargetAllocation {
    pub fn new(weights_by_ticker: FxHashMap<String, f64>) -> Self {
        Self { weights_by_ticker }
    }

    /// Stored weight for `ticker`, or 0.0 if absent.
    pub fn weight(&self, ticker: &str) -> f64 {
        self.weights_by_ticker.get(ticker).copied().unwrap_or(0.0)
    }

    /// Tickers with an explicit target weight (including zero weights).
    pub fn tickers(&self) -> impl Iterator<Item = &String> {
        self.weights_by_ticker.keys()
    }
}

/// Equal-weight default targets derived from the current holdings:
/// each asset type gets the same share, split equally across its tickers.
#[derive(Debug, Clone)]
pub struct DefaultTargets {
    /// Total weight per ticker (sums to 1.0).
    pub by_ticker: TargetAllocation,
    /// Weight per asset type (sums to 1.0).
    pub by_type: FxHashMap<String, f64>,
    /// Within-type weight per ticker (each type sums to 1.0).
    pub within_type_by_ticker: FxHashMap<String, f64>,
    /// Asset type per ticker.
    pub asset_type_by_ticker: FxHashMap<String, String>,
}

fn normalize_type(raw: &str) -> String {
    let t = raw.trim().to_uppercase();
    if t.is_empty() { "UNKNOWN".to_string() } else { t }
}

/// Build equal-weight default targets from `positions`.
///
/// A ticker appearing under two different asset types is rejected.
pub fn build_default_targets(positions: &[Position]) -> Result<DefaultTargets> {
    let mut tickers_by_type: FxHashMap<String, Vec<String>> = FxHashMap::default();
    let mut asset_type_by_ticker: FxHashMap<String, String> = FxHashMap::default();

    for p in positions {
        let ticker = normalize_ticker(&p.ticker);
        let asset_type = normalize_type(&p.asset_type);

        if let Some(prev) = asset_type_by_ticker.get(&ticker) {
            if *prev != asset_type {
                return Err(Error::ConflictingAssetType {
                    ticker,
                    first: prev.clone(),
                    second: asset_type,
                });
            }
        }

        asset_type_by_ticker.insert(ticker.clone(), asset_type.clone());
        let tickers = tickers_by_type.entry(asset_type).or_default();
        if !tickers.contains(&ticker) {
            tickers.push(ticker);
        }
    }

    let mut types: Vec<&String> = tickers_by_type.keys().collect();
    types.sort();

    if types.is_empty() {
        return Ok(DefaultTargets {
            by_ticker: TargetAllocation::default(),
            by_type: FxHashMap::default(),
            within_type_by_ticker: FxHashMap::default(),
            asset_type_by_ticker,
        });
    }

    let type_weight = 1.0 / types.len() as f64;
    let by_type: FxHashMap<String, f64> =
        types.iter().map(|at| ((*at).clone(), type_weight)).collect();

    let mut weights_total: FxHashMap<String, f64> = FxHashMap::default();
    let mut weights_within: FxHashMap<String, f64> = FxHashMap::default();

    for at in &types {
        let mut tickers = tickers_by_type[*at].clone();
        tickers.sort();
        let w_within = 1.0 / tickers.len() as f64;
        for ticker in tickers {
            weights_within.insert(ticker.clone(), w_within);
            weights_total.insert(ticker, type_weight * w_within);
        }
    }

    // make the total sum exactly 1.0, absorbing float drift
    let sum: f64 = weights_total.values().sum();
    if !weights_total.is_empty() && (sum - 1.0).abs() > 1e-12 {
        for w in weights_total.values_mut() {
            *w /= sum;
        }
    }

    Ok(DefaultTargets {
        by_ticker: TargetAllocation::new(weights_total),
        by_type,
        within_type_by_ticker: weights_within,
        asset_type_by_ticker,
    })
}
