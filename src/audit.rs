//! JSONL audit trail: one JSON object per line, appended per run.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::rebalance::{Mode, RebalanceResult};
use crate::report::PortfolioSummary;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

/// Convenience: log a run start event.
pub fn log_run_started(audit: &mut AuditLog, mode: Mode, positions_file: &str) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "mode": format!("{mode}"),
            "positions_file": positions_file,
        }),
    )
}

/// Convenience: log a computed trade plan.
pub fn log_plan(audit: &mut AuditLog, result: &RebalanceResult) -> Result<()> {
    let trades: Vec<_> = result
        .trades
        .iter()
        .map(|t| {
            serde_json::json!({
                "side": format!("{}", t.side),
                "ticker": t.ticker,
                "quantity": t.quantity,
                "price": t.price,
                "notional": t.notional(),
            })
        })
        .collect();

    audit.log(
        "plan_computed",
        serde_json::json!({
            "trades": trades,
            "cash_before": result.cash_before,
            "cash_after": result.cash_after,
        }),
    )
}

/// Convenience: log the post-trade portfolio snapshot.
pub fn log_applied(audit: &mut AuditLog, summary: &PortfolioSummary) -> Result<()> {
    audit.log(
        "trades_applied",
        serde_json::json!({
            "positions": summary.entries.len(),
            "cash": summary.cash,
            "total_value": summary.total_value,
        }),
    )
}

/// Convenience: log run completion.
pub fn log_run_completed(audit: &mut AuditLog, trades: usize) -> Result<()> {
    audit.log("run_completed", serde_json::json!({ "trades": trades }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_log_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&path).unwrap();
            log.log_simple("test_event").unwrap();
            log.log("test_data", serde_json::json!({"key": "value"}))
                .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }
        assert!(lines[0].contains("\"event\":\"test_event\""));
    }

    #[test]
    fn audit_log_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subdir").join("deep").join("audit.jsonl");

        let mut log = AuditLog::open(&path).unwrap();
        log.log_simple("test").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn plan_event_carries_trades_and_cash() {
        use crate::model::{Side, Trade};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let result = RebalanceResult {
            trades: vec![Trade::new("AAA", Side::Sell, 2.0, 10.0)],
            cash_before: 0.0,
            cash_after: 20.0,
        };

        {
            let mut log = AuditLog::open(&path).unwrap();
            log_plan(&mut log, &result).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"event\":\"plan_computed\""));
        assert!(contents.contains("\"cash_after\":20.0"));
        assert!(contents.contains("\"notional\":20.0"));
    }
}
