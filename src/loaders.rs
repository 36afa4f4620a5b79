//! CSV loaders for positions, prices, targets, and saved trade plans.
//!
//! Tickers and asset types are normalized here (trimmed, uppercased), so
//! everything downstream operates on pre-normalized keys. Number parsing
//! tolerates pt-BR decimal forms ("1.234,56", "1234,56") alongside plain
//! decimals.

use std::fs::File;
use std::path::Path;

use log::warn;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{Position, Side, Trade, normalize_ticker};
use crate::target::TargetAllocation;

/// Parse a decimal that may use comma as the decimal separator and dot as
/// a thousands separator.
pub fn parse_decimal(raw: &str) -> Result<f64> {
    let mut v = raw.trim().replace(' ', "");
    if v.is_empty() {
        return Err(Error::Loader("empty number".into()));
    }
    if v.contains(',') {
        if v.contains('.') {
            v = v.replace('.', "");
        }
        v = v.replace(',', ".");
    }
    v.parse::<f64>()
        .map_err(|_| Error::Loader(format!("invalid number: {raw:?}")))
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| Error::LoaderRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(csv::Reader::from_reader(file))
}

fn require_columns(rdr: &mut csv::Reader<File>, required: &[&str], what: &str) -> Result<()> {
    let headers = rdr.headers()?.clone();
    for col in required {
        if !headers.iter().any(|h| h.trim() == *col) {
            return Err(Error::Loader(format!(
                "{what} csv must have columns: {required:?}"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PositionRow {
    ticker: String,
    asset_type: String,
    quantity: String,
    price: String,
}

/// Load positions from a `ticker,asset_type,quantity,price` CSV.
pub fn load_positions_csv(path: impl AsRef<Path>) -> Result<Vec<Position>> {
    let path = path.as_ref();
    let mut rdr = open_reader(path)?;
    require_columns(
        &mut rdr,
        &["ticker", "asset_type", "quantity", "price"],
        "positions",
    )?;

    let mut out = Vec::new();
    for rec in rdr.deserialize() {
        let row: PositionRow = rec?;
        let ticker = normalize_ticker(&row.ticker);
        if ticker.is_empty() {
            return Err(Error::Loader("positions csv: empty ticker".into()));
        }
        let asset_type = row.asset_type.trim().to_uppercase();
        let quantity = parse_decimal(&row.quantity)
            .map_err(|_| Error::Loader(format!("positions csv: invalid quantity for {ticker}")))?;
        let price = parse_decimal(&row.price)
            .map_err(|_| Error::Loader(format!("positions csv: invalid price for {ticker}")))?;
        out.push(Position::new(ticker, asset_type, quantity, price));
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    ticker: String,
    price: String,
}

/// Load a ticker → price map from a `ticker,price` CSV.
pub fn load_prices_csv(path: impl AsRef<Path>) -> Result<FxHashMap<String, f64>> {
    let path = path.as_ref();
    let mut rdr = open_reader(path)?;
    require_columns(&mut rdr, &["ticker", "price"], "prices")?;

    let mut out = FxHashMap::default();
    for rec in rdr.deserialize() {
        let row: PriceRow = rec?;
        let ticker = normalize_ticker(&row.ticker);
        if ticker.is_empty() {
            return Err(Error::Loader("prices csv: empty ticker".into()));
        }
        let price = parse_decimal(&row.price)
            .map_err(|_| Error::Loader(format!("prices csv: invalid price for {ticker}")))?;
        out.insert(ticker, price);
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct TargetRow {
    ticker: String,
    weight: String,
}

/// Load a target allocation from a `ticker,weight` CSV. Weights must be
/// non-negative; they are not required to sum to 1.
pub fn load_targets_csv(path: impl AsRef<Path>) -> Result<TargetAllocation> {
    let path = path.as_ref();
    let mut rdr = open_reader(path)?;
    require_columns(&mut rdr, &["ticker", "weight"], "targets")?;

    let mut weights = FxHashMap::default();
    for rec in rdr.deserialize() {
        let row: TargetRow = rec?;
        let ticker = normalize_ticker(&row.ticker);
        if ticker.is_empty() {
            return Err(Error::Loader("targets csv: empty ticker".into()));
        }
        let weight = parse_decimal(&row.weight)
            .map_err(|_| Error::Loader(format!("targets csv: invalid weight for {ticker}")))?;
        if weight < 0.0 {
            return Err(Error::Loader(format!(
                "targets csv: weight must be >= 0 for {ticker}"
            )));
        }
        weights.insert(ticker, weight);
    }
    Ok(TargetAllocation::new(weights))
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    side: String,
    ticker: String,
    quantity: String,
    price: String,
}

/// Load a saved trade plan from a `side,ticker,quantity,price` CSV —
/// the same shape the `rebalance` command prints.
pub fn load_trades_csv(path: impl AsRef<Path>) -> Result<Vec<Trade>> {
    let path = path.as_ref();
    let mut rdr = open_reader(path)?;
    require_columns(&mut rdr, &["side", "ticker", "quantity", "price"], "trades")?;

    let mut out = Vec::new();
    for rec in rdr.deserialize() {
        let row: TradeRow = rec?;
        let side: Side = row.side.parse()?;
        let ticker = normalize_ticker(&row.ticker);
        if ticker.is_empty() {
            return Err(Error::Loader("trades csv: empty ticker".into()));
        }
        let quantity = parse_decimal(&row.quantity)
            .map_err(|_| Error::Loader(format!("trades csv: invalid quantity for {ticker}")))?;
        if quantity <= 0.0 {
            return Err(Error::Loader(format!(
                "trades csv: quantity must be > 0 for {ticker}"
            )));
        }
        let price = parse_decimal(&row.price)
            .map_err(|_| Error::Loader(format!("trades csv: invalid price for {ticker}")))?;
        out.push(Trade::new(ticker, side, quantity, price));
    }
    Ok(out)
}

/// Prices resolved for a set of positions, plus the tickers that had to
/// fall back to their stale position price.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPrices {
    pub prices: FxHashMap<String, f64>,
    pub fallback_used: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SheetRow {
    ticker: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    previous_close: String,
}

/// Resolve a price for every position from a price-sheet CSV
/// (`ticker,price,previous_close`): sheet price, else previous close,
/// else the position's own last-known price (reported as a fallback).
pub fn load_prices_for_positions(
    positions: &[Position],
    sheet: impl AsRef<Path>,
) -> Result<ResolvedPrices> {
    let path = sheet.as_ref();
    let mut rdr = open_reader(path)?;
    require_columns(
        &mut rdr,
        &["ticker", "price", "previous_close"],
        "price sheet",
    )?;

    let mut sheet_prices: FxHashMap<String, f64> = FxHashMap::default();
    for rec in rdr.deserialize() {
        let row: SheetRow = rec?;
        let ticker = normalize_ticker(&row.ticker);
        if ticker.is_empty() {
            continue;
        }
        let price = parse_decimal(&row.price)
            .ok()
            .or_else(|| parse_decimal(&row.previous_close).ok());
        if let Some(price) = price {
            sheet_prices.insert(ticker, price);
        }
    }

    let mut resolved = ResolvedPrices::default();
    for p in positions {
        match sheet_prices.get(&p.ticker) {
            Some(&price) => {
                resolved.prices.insert(p.ticker.clone(), price);
            }
            None => {
                warn!(
                    "no sheet price for {}; using last-known position price {}",
                    p.ticker, p.price
                );
                resolved.prices.insert(p.ticker.clone(), p.price);
                resolved.fallback_used.push(p.ticker.clone());
            }
        }
    }
    resolved.fallback_used.sort();
    Ok(resolved)
}

/// Write a target allocation to a `ticker,weight` CSV, sorted by ticker.
pub fn write_targets_csv(target: &TargetAllocation, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(["ticker", "weight"])?;

    let mut tickers: Vec<&String> = target.weights_by_ticker.keys().collect();
    tickers.sort();
    for ticker in tickers {
        let weight = target.weights_by_ticker.get(ticker).copied().unwrap_or(0.0);
        let formatted = format!("{weight:.12}");
        wtr.write_record([ticker.as_str(), formatted.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}
