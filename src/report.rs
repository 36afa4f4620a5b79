//! Mark-to-market portfolio snapshots for display and the audit trail.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::Result;
use crate::model::Portfolio;
use crate::rebalance::need_price;

/// One position's valuation line.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub ticker: String,
    pub asset_type: String,
    pub quantity: f64,
    pub price: f64,
    pub market_value: f64,
    pub weight: f64,
}

/// Mark-to-market snapshot of a portfolio at the supplied prices.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub entries: Vec<SummaryEntry>,
    pub cash: f64,
    pub total_value: f64,
}

/// Value every position at the supplied prices. Entries come back sorted
/// by ticker; weights are shares of total value (positions plus cash).
pub fn summarize(portfolio: &Portfolio, prices: &FxHashMap<String, f64>) -> Result<PortfolioSummary> {
    let mut entries = Vec::with_capacity(portfolio.positions.len());
    let mut positions_value = 0.0;

    for p in &portfolio.positions {
        let price = need_price(prices, &p.ticker)?;
        let market_value = p.market_value(price);
        positions_value += market_value;
        entries.push(SummaryEntry {
            ticker: p.ticker.clone(),
            asset_type: p.asset_type.clone(),
            quantity: p.quantity,
            price,
            market_value,
            weight: 0.0,
        });
    }

    let total_value = positions_value + portfolio.cash;
    for e in &mut entries {
        e.weight = if total_value > 0.0 {
            e.market_value / total_value
        } else {
            0.0
        };
    }
    entries.sort_by(|a, b| a.ticker.cmp(&b.ticker));

    Ok(PortfolioSummary {
        entries,
        cash: portfolio.cash,
        total_value,
    })
}

impl fmt::Display for PortfolioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {:10} {:8} {:>10} {:>10} {:>12} {:>7}",
            "Ticker", "Type", "Qty", "Price", "Value", "Weight"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:10} {:8} {:>10.4} {:>10.2} {:>12.2} {:>6.1}%",
                e.ticker,
                e.asset_type,
                e.quantity,
                e.price,
                e.market_value,
                e.weight * 100.0,
            )?;
        }
        writeln!(f, "  cash:  {:.2}", self.cash)?;
        writeln!(f, "  total: {:.2}", self.total_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::Position;

    fn prices(pairs: &[(&str, f64)]) -> FxHashMap<String, f64> {
        pairs.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn weights_are_shares_of_total_value() {
        let pf = Portfolio::new(
            vec![
                Position::new("AAA", "STOCK", 10.0, 10.0),
                Position::new("BBB", "FII", 5.0, 20.0),
            ],
            100.0,
        );
        let summary = summarize(&pf, &prices(&[("AAA", 10.0), ("BBB", 20.0)])).unwrap();

        assert_eq!(summary.total_value, 300.0);
        let aaa = &summary.entries[0];
        assert_eq!(aaa.ticker, "AAA");
        assert!((aaa.weight - 100.0 / 300.0).abs() < 1e-12);
    }

    #[test]
    fn supplied_prices_override_stale_position_prices() {
        let pf = Portfolio::new(vec![Position::new("AAA", "STOCK", 10.0, 10.0)], 0.0);
        let summary = summarize(&pf, &prices(&[("AAA", 12.0)])).unwrap();
        assert_eq!(summary.entries[0].price, 12.0);
        assert_eq!(summary.entries[0].market_value, 120.0);
    }

    #[test]
    fn missing_price_fails() {
        let pf = Portfolio::new(vec![Position::new("AAA", "STOCK", 10.0, 10.0)], 0.0);
        let err = summarize(&pf, &prices(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingPrice(t) if t == "AAA"));
    }

    #[test]
    fn display_renders_table() {
        let pf = Portfolio::new(vec![Position::new("AAA", "STOCK", 10.0, 10.0)], 50.0);
        let summary = summarize(&pf, &prices(&[("AAA", 10.0)])).unwrap();
        let s = format!("{summary}");
        assert!(s.contains("AAA"));
        assert!(s.contains("total: 150.00"));
    }
}
