//! Rebalancing engine: target weights to an ordered buy/sell trade plan.
//!
//! Computes the trades that move a portfolio toward a target allocation:
//! a SELL leg over the most-overweight tickers first, then a BUY leg that
//! splits the available cash proportionally across asset types and across
//! tickers within a type, with a greedy whole-unit top-up pass for cash
//! stranded by lot rounding.
//!
//! The engine is pure: no I/O, no shared state, deterministic for a given
//! input. Within one invocation ordering is strict — the BUY leg always
//! sees the post-sell valuation state.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{EPSILON, Portfolio, Side, Trade};
use crate::target::TargetAllocation;

/// Which legs of the plan to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Buy,
    Sell,
    Trade,
}

impl Mode {
    fn sells(self) -> bool {
        matches!(self, Mode::Sell | Mode::Trade)
    }

    fn buys(self) -> bool {
        matches!(self, Mode::Buy | Mode::Trade)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Buy => write!(f, "BUY"),
            Mode::Sell => write!(f, "SELL"),
            Mode::Trade => write!(f, "TRADE"),
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Mode::Buy),
            "SELL" => Ok(Mode::Sell),
            "TRADE" => Ok(Mode::Trade),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

/// Options for one rebalance run.
#[derive(Debug, Clone)]
pub struct RebalanceOptions {
    pub mode: Mode,
    /// Allow fractional unit quantities instead of flooring to whole lots.
    pub allow_fractional: bool,
    /// Discard computed trades below this notional.
    pub min_trade_notional: f64,
}

impl Default for RebalanceOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Trade,
            allow_fractional: false,
            min_trade_notional: 0.0,
        }
    }
}

/// The trade plan produced by one engine invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceResult {
    /// All SELL trades (most overweight first), then all BUY trades.
    pub trades: Vec<Trade>,
    pub cash_before: f64,
    pub cash_after: f64,
}

/// Floor to a whole number of units, absorbing float noise so values that
/// are whole up to rounding error do not lose a unit.
fn floor_units(x: f64) -> f64 {
    (x + EPSILON).floor()
}

/// Resolve a required price. Missing or non-positive prices are hard
/// errors; fallback policy belongs to the calling layer.
pub(crate) fn need_price(prices: &FxHashMap<String, f64>, ticker: &str) -> Result<f64> {
    match prices.get(ticker) {
        None => Err(Error::MissingPrice(ticker.to_string())),
        Some(&price) if price <= 0.0 => Err(Error::InvalidPrice {
            ticker: ticker.to_string(),
            price,
        }),
        Some(&price) => Ok(price),
    }
}

/// Valuation state threaded between the SELL and BUY legs.
///
/// The SELL leg consumes one snapshot and returns the next, so the BUY leg
/// always sees post-sell quantities, values, and deltas. Deltas are in
/// value terms: positive = underweight, negative = overweight.
#[derive(Debug, Clone)]
struct Valuation {
    cash: f64,
    qty_by_ticker: FxHashMap<String, f64>,
    current_values: FxHashMap<String, f64>,
    target_values: FxHashMap<String, f64>,
    deltas: FxHashMap<String, f64>,
}

impl Valuation {
    /// Price every held position and derive per-ticker target values and
    /// deltas over the universe of held and targeted tickers. Prices are
    /// validated lazily, only for tickers actually held with quantity > 0.
    fn compute(
        portfolio: &Portfolio,
        target: &TargetAllocation,
        prices: &FxHashMap<String, f64>,
    ) -> Result<Self> {
        let cash = portfolio.cash;

        let mut qty_by_ticker: FxHashMap<String, f64> = FxHashMap::default();
        for p in &portfolio.positions {
            qty_by_ticker.insert(p.ticker.clone(), p.quantity);
        }

        let mut current_values: FxHashMap<String, f64> = FxHashMap::default();
        for (ticker, &qty) in &qty_by_ticker {
            if qty <= 0.0 {
                continue;
            }
            let price = need_price(prices, ticker)?;
            current_values.insert(ticker.clone(), qty * price);
        }

        let total_value: f64 = current_values.values().sum::<f64>() + cash;

        let mut target_values: FxHashMap<String, f64> = FxHashMap::default();
        let mut deltas: FxHashMap<String, f64> = FxHashMap::default();
        for ticker in current_values.keys().chain(target.tickers()) {
            if target_values.contains_key(ticker) {
                continue;
            }
            let target_value = total_value * target.weight(ticker);
            let current = current_values.get(ticker).copied().unwrap_or(0.0);
            target_values.insert(ticker.clone(), target_value);
            deltas.insert(ticker.clone(), target_value - current);
        }

        Ok(Self {
            cash,
            qty_by_ticker,
            current_values,
            target_values,
            deltas,
        })
    }
}

/// SELL the most overweight tickers first, clamped to the held quantity.
/// Returns the emitted trades and the post-sell snapshot.
fn sell_leg(
    mut val: Valuation,
    prices: &FxHashMap<String, f64>,
    allow_fractional: bool,
    min_trade_notional: f64,
) -> Result<(Vec<Trade>, Valuation)> {
    let mut overweight: Vec<(String, f64)> = val
        .deltas
        .iter()
        .filter(|(_, delta)| **delta < 0.0)
        .map(|(ticker, delta)| (ticker.clone(), *delta))
        .collect();
    // most negative delta first; ticker breaks exact ties deterministically
    overweight.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let mut trades = Vec::new();
    for (ticker, delta) in overweight {
        let held = val.qty_by_ticker.get(&ticker).copied().unwrap_or(0.0);
        if held <= 0.0 {
            continue;
        }

        let price = need_price(prices, &ticker)?;
        let desired = (-delta) / price;
        let rounded = if allow_fractional {
            desired
        } else {
            floor_units(desired)
        };
        let qty = rounded.min(held);

        if qty <= 0.0 {
            continue;
        }
        let notional = qty * price;
        if notional < min_trade_notional {
            continue;
        }

        trades.push(Trade::new(&ticker, Side::Sell, qty, price));
        val.cash += notional;

        // recompute this ticker's state so the BUY leg sees the sell
        let current = val.current_values.get(&ticker).copied().unwrap_or(0.0) - notional;
        let target_value = val.target_values.get(&ticker).copied().unwrap_or(0.0);
        val.current_values.insert(ticker.clone(), current);
        val.qty_by_ticker.insert(ticker.clone(), held - qty);
        val.deltas.insert(ticker, target_value - current);
    }

    Ok((trades, val))
}

/// Record a planned buy, merging quantities per ticker. Returns the
/// notional actually added (0.0 when filtered by the minimum notional).
fn plan_buy(
    ticker: &str,
    qty: f64,
    prices: &FxHashMap<String, f64>,
    min_trade_notional: f64,
    qty_acc: &mut FxHashMap<String, f64>,
    bought_value: &mut FxHashMap<String, f64>,
) -> Result<f64> {
    if qty <= 0.0 {
        return Ok(0.0);
    }
    let price = need_price(prices, ticker)?;
    let notional = qty * price;
    if notional < min_trade_notional {
        return Ok(0.0);
    }
    *qty_acc.entry(ticker.to_string()).or_insert(0.0) += qty;
    *bought_value.entry(ticker.to_string()).or_insert(0.0) += notional;
    Ok(notional)
}

/// Two-level proportional budget split plus a whole-unit top-up pass.
///
/// Level 1 splits all available cash across asset types by aggregate
/// underweight need; level 2 splits a type's budget across its tickers,
/// capped at each ticker's own value shortfall even when that strands
/// part of the type budget. Leftover cash from lot rounding is then spent
/// one unit at a time on the largest relative gap (whole-unit mode only).
fn buy_leg(
    val: Valuation,
    prices: &FxHashMap<String, f64>,
    asset_type_by_ticker: &FxHashMap<String, String>,
    allow_fractional: bool,
    min_trade_notional: f64,
) -> Result<(Vec<Trade>, f64)> {
    let cash = val.cash;

    let mut buy_tickers: Vec<String> = val
        .deltas
        .iter()
        .filter(|(_, delta)| **delta > 0.0)
        .map(|(ticker, _)| ticker.clone())
        .collect();
    buy_tickers.sort();

    if cash <= 0.0 || buy_tickers.is_empty() {
        return Ok((Vec::new(), cash));
    }

    let mut by_type: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for ticker in &buy_tickers {
        let asset_type = asset_type_by_ticker
            .get(ticker)
            .cloned()
            .unwrap_or_else(|| "UNKNOWN".to_string());
        by_type.entry(asset_type).or_default().push(ticker.clone());
    }

    let need_of = |ticker: &String| val.deltas.get(ticker).copied().unwrap_or(0.0).max(0.0);

    let mut need_by_type: FxHashMap<String, f64> = FxHashMap::default();
    for (asset_type, tickers) in &by_type {
        need_by_type.insert(asset_type.clone(), tickers.iter().map(need_of).sum());
    }
    let total_need: f64 = need_by_type.values().sum();
    if total_need <= 0.0 {
        return Ok((Vec::new(), cash));
    }

    let mut qty_acc: FxHashMap<String, f64> = FxHashMap::default();
    let mut bought_value: FxHashMap<String, f64> = FxHashMap::default();
    let mut spent_total = 0.0;

    // level 1: budget per asset type, proportional to aggregate need and
    // computed against the original cash (not updated mid-pass)
    let mut types: Vec<&String> = by_type.keys().collect();
    types.sort();

    for asset_type in types {
        let tickers = &by_type[asset_type];
        let need_type = need_by_type.get(asset_type).copied().unwrap_or(0.0);
        let budget_type = cash * need_type / total_need;
        if budget_type <= 0.0 || need_type <= 0.0 {
            continue;
        }

        // level 2: split the type budget across its tickers, never
        // planning past a ticker's own value shortfall
        for ticker in tickers {
            let need = need_of(ticker);
            if need <= 0.0 {
                continue;
            }

            let price = need_price(prices, ticker)?;
            let budget_ticker = budget_type * need / need_type;
            let budget_eff = budget_ticker.min(need);

            let qty = if allow_fractional {
                budget_eff / price
            } else {
                floor_units(budget_eff / price)
            };
            if qty <= 0.0 {
                continue;
            }

            spent_total += plan_buy(
                ticker,
                qty,
                prices,
                min_trade_notional,
                &mut qty_acc,
                &mut bought_value,
            )?;
        }
    }

    let mut cash_left = cash - spent_total;

    // level 3: greedy top-up — one whole unit at a time of the largest
    // relative gap still affordable. Terminates because each iteration
    // spends at least the cheapest eligible price, or breaks.
    if !allow_fractional && cash_left > 0.0 {
        loop {
            let mut best_ticker: Option<&String> = None;
            let mut best_score = 0.0;

            for ticker in &buy_tickers {
                let price = need_price(prices, ticker)?;
                if price > cash_left {
                    continue;
                }
                let target_value = val.target_values.get(ticker).copied().unwrap_or(0.0);
                if target_value <= 0.0 {
                    continue;
                }
                let covered = val.current_values.get(ticker).copied().unwrap_or(0.0)
                    + bought_value.get(ticker).copied().unwrap_or(0.0);
                let missing = target_value - covered;
                if missing <= 0.0 {
                    continue;
                }

                let score = missing / target_value;
                if score > best_score {
                    best_score = score;
                    best_ticker = Some(ticker);
                }
            }

            let Some(ticker) = best_ticker else { break };
            let bought = plan_buy(
                ticker,
                1.0,
                prices,
                min_trade_notional,
                &mut qty_acc,
                &mut bought_value,
            )?;
            if bought <= 0.0 {
                // a single unit fell below the minimum notional
                break;
            }
            cash_left -= bought;
        }
    }

    // one BUY trade per ticker with accumulated quantity
    let mut planned: Vec<&String> = qty_acc.keys().collect();
    planned.sort();

    let mut trades = Vec::with_capacity(planned.len());
    for ticker in planned {
        let qty = qty_acc.get(ticker).copied().unwrap_or(0.0);
        if qty <= 0.0 {
            continue;
        }
        let price = need_price(prices, ticker)?;
        trades.push(Trade::new(ticker.as_str(), Side::Buy, qty, price));
    }

    Ok((trades, cash_left))
}

/// Compute the trade plan that moves `portfolio` toward `target`.
///
/// Prices are validated lazily: only tickers actually priced during the
/// run (held with positive quantity, or considered for buying) must be
/// present and positive in `prices`. The returned trade list holds all
/// SELLs (leg order) followed by all BUYs; settling it in that order is
/// what guarantees sells free up cash before buys commit it.
pub fn rebalance(
    portfolio: &Portfolio,
    target: &TargetAllocation,
    prices: &FxHashMap<String, f64>,
    opts: &RebalanceOptions,
) -> Result<RebalanceResult> {
    let cash_before = portfolio.cash;
    let asset_type_by_ticker = portfolio.asset_types();

    let mut val = Valuation::compute(portfolio, target, prices)?;

    let mut trades = Vec::new();
    if opts.mode.sells() {
        let (sell_trades, next) = sell_leg(
            val,
            prices,
            opts.allow_fractional,
            opts.min_trade_notional,
        )?;
        trades.extend(sell_trades);
        val = next;
    }

    let mut cash_after = val.cash;
    if opts.mode.buys() {
        let (buy_trades, cash_left) = buy_leg(
            val,
            prices,
            &asset_type_by_ticker,
            opts.allow_fractional,
            opts.min_trade_notional,
        )?;
        trades.extend(buy_trades);
        cash_after = cash_left;
    }

    Ok(RebalanceResult {
        trades,
        cash_before,
        cash_after,
    })
}
