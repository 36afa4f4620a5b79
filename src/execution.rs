//! Trade settlement: apply a plan to a portfolio, producing the next one.

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::model::{EPSILON, Portfolio, Position, Side, Trade};

/// Apply `trades` sequentially, in list order, and return a new Portfolio.
/// The input is never mutated.
///
/// A BUY that opens a new ticker resolves its asset type from
/// `asset_type_by_ticker`, falling back to `default_asset_type`; a traded
/// position's price becomes the trade's execution price. Output positions
/// are sorted by ticker.
///
/// Order matters: the engine emits SELLs before BUYs so sold positions
/// free up cash before it is committed — reordering a plan can turn a
/// feasible run into `InsufficientCash`.
pub fn apply_trades(
    portfolio: &Portfolio,
    trades: &[Trade],
    asset_type_by_ticker: &FxHashMap<String, String>,
    default_asset_type: Option<&str>,
) -> Result<Portfolio> {
    let mut pos_by_ticker: FxHashMap<String, Position> = portfolio
        .positions
        .iter()
        .map(|p| (p.ticker.clone(), p.clone()))
        .collect();
    let mut cash = portfolio.cash;

    for trade in trades {
        let qty = trade.quantity;
        let notional = trade.notional();

        match trade.side {
            Side::Sell => {
                let Some(position) = pos_by_ticker.get_mut(&trade.ticker) else {
                    return Err(Error::UnknownPosition(trade.ticker.clone()));
                };
                if qty > position.quantity + EPSILON {
                    return Err(Error::Oversell {
                        ticker: trade.ticker.clone(),
                        requested: qty,
                        held: position.quantity,
                    });
                }

                cash += notional;
                position.quantity -= qty;
                position.price = trade.price;

                let closed = position.quantity <= EPSILON;
                if closed {
                    pos_by_ticker.remove(&trade.ticker);
                }
            }
            Side::Buy => {
                if notional > cash + EPSILON {
                    return Err(Error::InsufficientCash {
                        ticker: trade.ticker.clone(),
                        needed: notional,
                        available: cash,
                    });
                }

                cash -= notional;
                if let Some(position) = pos_by_ticker.get_mut(&trade.ticker) {
                    position.quantity += qty;
                    position.price = trade.price;
                } else {
                    let asset_type = asset_type_by_ticker
                        .get(&trade.ticker)
                        .map(String::as_str)
                        .or(default_asset_type)
                        .ok_or_else(|| Error::MissingAssetType(trade.ticker.clone()))?;
                    pos_by_ticker.insert(
                        trade.ticker.clone(),
                        Position::new(trade.ticker.clone(), asset_type, qty, trade.price),
                    );
                }
            }
        }
    }

    let mut positions: Vec<Position> = pos_by_ticker.into_values().collect();
    positions.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    Ok(Portfolio::new(positions, cash))
}
