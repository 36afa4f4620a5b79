//! Property-based tests for engine and settlement invariants.
//!
//! These use proptest to verify that the plan/settle guarantees hold
//! across randomly generated portfolios, targets, and constraints.

use proptest::prelude::*;
use rustc_hash::FxHashMap;

use portfolio_rebalancer::execution::apply_trades;
use portfolio_rebalancer::model::{Portfolio, Position, Side};
use portfolio_rebalancer::rebalance::{Mode, RebalanceOptions, rebalance};
use portfolio_rebalancer::target::TargetAllocation;

const TICKERS: [&str; 5] = ["AAA", "BBB", "CCC", "DDD", "EEE"];
const TYPES: [&str; 3] = ["STOCK", "FII", "BOND"];

/// Generate a price map covering every ticker the run could touch.
fn prices_strategy() -> impl Strategy<Value = FxHashMap<String, f64>> {
    prop::collection::vec(1u32..=500u32, TICKERS.len()).prop_map(|raw| {
        TICKERS
            .iter()
            .zip(raw)
            .map(|(t, p)| (t.to_string(), p as f64))
            .collect()
    })
}

/// Generate a portfolio holding a subset of the fixed ticker universe.
fn portfolio_strategy() -> impl Strategy<Value = Portfolio> {
    let position = (0usize..TICKERS.len(), 0usize..TYPES.len(), 0u32..=1_000u32, 1u32..=500u32)
        .prop_map(|(t, at, qty, px)| {
            Position::new(TICKERS[t], TYPES[at], qty as f64, px as f64)
        });
    (prop::collection::vec(position, 0..TICKERS.len()), 0u32..=100_000u32).prop_map(
        |(mut positions, cash)| {
            // unique by ticker
            positions.sort_by(|a, b| a.ticker.cmp(&b.ticker));
            positions.dedup_by(|a, b| a.ticker == b.ticker);
            Portfolio::new(positions, cash as f64)
        },
    )
}

/// Generate target weights over a subset of the universe, scaled so the
/// total stays within [0, 1].
fn target_strategy() -> impl Strategy<Value = TargetAllocation> {
    prop::collection::vec(0u32..=100u32, TICKERS.len()).prop_map(|raw| {
        let sum: u32 = raw.iter().sum();
        let weights = TICKERS
            .iter()
            .zip(raw)
            .filter(|(_, w)| *w > 0)
            .map(|(t, w)| {
                let w = if sum > 0 { w as f64 / sum as f64 } else { 0.0 };
                (t.to_string(), w)
            })
            .collect();
        TargetAllocation::new(weights)
    })
}

fn mode_strategy() -> impl Strategy<Value = Mode> {
    prop_oneof![Just(Mode::Buy), Just(Mode::Sell), Just(Mode::Trade)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // ========================================================================
    // PLAN INVARIANTS
    // ========================================================================

    /// Whole-unit mode only ever emits integer quantities.
    #[test]
    fn whole_unit_quantities(
        pf in portfolio_strategy(),
        target in target_strategy(),
        prices in prices_strategy(),
        mode in mode_strategy(),
    ) {
        let opts = RebalanceOptions { mode, allow_fractional: false, min_trade_notional: 0.0 };
        let result = rebalance(&pf, &target, &prices, &opts).unwrap();

        for trade in &result.trades {
            prop_assert!(trade.quantity > 0.0);
            prop_assert!(
                (trade.quantity - trade.quantity.round()).abs() < 1e-9,
                "non-integer quantity {} for {}", trade.quantity, trade.ticker
            );
        }
    }

    /// No emitted trade falls below the minimum notional.
    #[test]
    fn min_notional_respected(
        pf in portfolio_strategy(),
        target in target_strategy(),
        prices in prices_strategy(),
        mode in mode_strategy(),
        min_notional in 0u32..=500u32,
    ) {
        let opts = RebalanceOptions {
            mode,
            allow_fractional: false,
            min_trade_notional: min_notional as f64,
        };
        let result = rebalance(&pf, &target, &prices, &opts).unwrap();

        for trade in &result.trades {
            prop_assert!(
                trade.notional() >= min_notional as f64 - 1e-9,
                "trade {} {} below min notional", trade.ticker, trade.notional()
            );
        }
    }

    /// A SELL never exceeds the quantity held when the plan was computed.
    #[test]
    fn sells_bounded_by_holdings(
        pf in portfolio_strategy(),
        target in target_strategy(),
        prices in prices_strategy(),
    ) {
        let opts = RebalanceOptions { mode: Mode::Trade, allow_fractional: false, min_trade_notional: 0.0 };
        let result = rebalance(&pf, &target, &prices, &opts).unwrap();

        for trade in result.trades.iter().filter(|t| t.side == Side::Sell) {
            let held = pf
                .position(&trade.ticker)
                .map(|p| p.quantity)
                .unwrap_or(0.0);
            prop_assert!(
                trade.quantity <= held + 1e-9,
                "sold {} of {} but held {}", trade.quantity, trade.ticker, held
            );
        }
    }

    /// Buys never spend more than the cash available at the start of the
    /// BUY leg (original cash plus sell proceeds).
    #[test]
    fn buys_bounded_by_available_cash(
        pf in portfolio_strategy(),
        target in target_strategy(),
        prices in prices_strategy(),
        mode in mode_strategy(),
    ) {
        let opts = RebalanceOptions { mode, allow_fractional: false, min_trade_notional: 0.0 };
        let result = rebalance(&pf, &target, &prices, &opts).unwrap();

        let sells: f64 = result.trades.iter()
            .filter(|t| t.side == Side::Sell)
            .map(|t| t.notional())
            .sum();
        let buys: f64 = result.trades.iter()
            .filter(|t| t.side == Side::Buy)
            .map(|t| t.notional())
            .sum();

        prop_assert!(buys <= pf.cash + sells + 1e-9);
        prop_assert!(result.cash_after >= -1e-9);
    }

    /// The reported cash delta matches the trade notionals exactly.
    #[test]
    fn cash_accounting_is_exact(
        pf in portfolio_strategy(),
        target in target_strategy(),
        prices in prices_strategy(),
        mode in mode_strategy(),
    ) {
        let opts = RebalanceOptions { mode, allow_fractional: false, min_trade_notional: 0.0 };
        let result = rebalance(&pf, &target, &prices, &opts).unwrap();

        let sells: f64 = result.trades.iter()
            .filter(|t| t.side == Side::Sell)
            .map(|t| t.notional())
            .sum();
        let buys: f64 = result.trades.iter()
            .filter(|t| t.side == Side::Buy)
            .map(|t| t.notional())
            .sum();

        prop_assert!(
            (result.cash_after - (result.cash_before + sells - buys)).abs() < 1e-9
        );
    }

    /// All SELLs come before all BUYs in the emitted plan.
    #[test]
    fn plan_orders_sells_before_buys(
        pf in portfolio_strategy(),
        target in target_strategy(),
        prices in prices_strategy(),
    ) {
        let opts = RebalanceOptions { mode: Mode::Trade, allow_fractional: false, min_trade_notional: 0.0 };
        let result = rebalance(&pf, &target, &prices, &opts).unwrap();

        let mut seen_buy = false;
        for trade in &result.trades {
            match trade.side {
                Side::Buy => seen_buy = true,
                Side::Sell => prop_assert!(!seen_buy, "SELL after BUY in plan"),
            }
        }
    }

    // ========================================================================
    // SETTLEMENT INVARIANTS
    // ========================================================================

    /// Every generated plan settles, and settlement lands exactly on the
    /// engine's predicted cash with no negative quantities left behind.
    /// Whole units with integer prices keep the arithmetic exact.
    #[test]
    fn plans_settle_conservatively(
        pf in portfolio_strategy(),
        target in target_strategy(),
        prices in prices_strategy(),
        mode in mode_strategy(),
    ) {
        let opts = RebalanceOptions { mode, allow_fractional: false, min_trade_notional: 0.0 };
        let result = rebalance(&pf, &target, &prices, &opts).unwrap();

        let asset_types = pf.asset_types();
        let post = apply_trades(&pf, &result.trades, &asset_types, Some("STOCK")).unwrap();

        prop_assert!((post.cash - result.cash_after).abs() < 1e-9);
        for p in &post.positions {
            // zero-quantity rows can pre-exist; trades never drive below zero
            prop_assert!(p.quantity >= 0.0, "negative quantity for {}", p.ticker);
        }

        // value at unchanged prices is conserved through settlement
        let value = |pf: &Portfolio| -> f64 {
            pf.positions.iter()
                .map(|p| p.quantity * prices[&p.ticker])
                .sum::<f64>() + pf.cash
        };
        prop_assert!((value(&pf) - value(&post)).abs() < 1e-6);
    }
}
