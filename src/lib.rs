//! Portfolio rebalancing engine.
//!
//! Computes the buy/sell trades that move a portfolio of priced holdings
//! plus cash toward a target allocation, under lot-granularity, minimum
//! trade size, and directional-mode constraints, then settles the plan
//! into the next portfolio snapshot.
//!
//! The core ([`rebalance`], [`execution`]) is pure and synchronous: no
//! I/O, no shared state, deterministic for a given input, safe to call
//! concurrently with distinct inputs. CSV loading, reporting, TOML
//! configuration, and the JSONL audit trail live in the surrounding
//! modules and are used by the `rebalancer` binary.

pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod loaders;
pub mod model;
pub mod rebalance;
pub mod report;
pub mod target;

pub use error::{Error, Result};
pub use execution::apply_trades;
pub use model::{Portfolio, Position, Side, Trade};
pub use rebalance::{Mode, RebalanceOptions, RebalanceResult, rebalance};
pub use target::TargetAllocation;
