//! Structured diagnostics and run reports.
//!
//! Non-fatal conditions encountered during a run are accumulated into the
//! run's report and logged as structured tracing events; they never abort the
//! run.

use serde::Serialize;
use uuid::Uuid;

/// A non-fatal condition observed while matching or reconciling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Diagnostic {
    /// A backlog row failed to decode. The transaction is still marked
    /// processed so it cannot wedge the loop.
    MalformedRecord { id: i64, detail: String },
    /// A closing transaction with no open trade for its symbol. No trade is
    /// fabricated.
    UnmatchedClose { id: i64, symbol: String },
    /// A resumed run re-presented a transaction the store had already
    /// applied.
    AlreadyApplied { id: i64 },
    /// A closing transaction's amount exceeds the resolved trade's remaining
    /// open quantity.
    ExcessiveClose { id: i64, symbol: String },
    /// A closed trade with zero opening price; its profit percentage is left
    /// unset.
    #[serde(rename_all = "camelCase")]
    DegenerateTrade { trade_id: i64 },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MalformedRecord { .. } => "MalformedRecord",
            Diagnostic::UnmatchedClose { .. } => "UnmatchedClose",
            Diagnostic::AlreadyApplied { .. } => "AlreadyApplied",
            Diagnostic::ExcessiveClose { .. } => "ExcessiveClose",
            Diagnostic::DegenerateTrade { .. } => "DegenerateTrade",
        }
    }
}

/// Counters and diagnostics for one matcher run over the whole backlog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub run_id: Uuid,
    pub pages: u64,
    pub transactions_processed: u64,
    pub trades_opened: u64,
    pub closings_applied: u64,
    pub diagnostics: Vec<Diagnostic>,
    pub elapsed_ms: u64,
}

/// Counters and diagnostics for one profit reconciliation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub run_id: Uuid,
    /// Closed trades selected for reconciliation.
    pub matched: u64,
    /// Trades whose profit fields actually changed.
    pub modified: u64,
    pub diagnostics: Vec<Diagnostic>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_kind_names() {
        let d = Diagnostic::UnmatchedClose {
            id: 7,
            symbol: "XYZ".to_string(),
        };
        assert_eq!(d.kind(), "UnmatchedClose");
    }

    #[test]
    fn test_diagnostic_serializes_with_kind_tag() {
        let d = Diagnostic::MalformedRecord {
            id: 3,
            detail: "invalid amount".to_string(),
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "MalformedRecord");
        assert_eq!(json["id"], 3);
    }

    #[test]
    fn test_degenerate_trade_field_is_camel_case() {
        let d = Diagnostic::DegenerateTrade { trade_id: 12 };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["tradeId"], 12);
    }

    #[test]
    fn test_match_report_serializes_camel_case() {
        let report = MatchReport {
            run_id: Uuid::nil(),
            pages: 2,
            transactions_processed: 9,
            trades_opened: 3,
            closings_applied: 4,
            diagnostics: vec![],
            elapsed_ms: 17,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["transactionsProcessed"], 9);
        assert_eq!(json["closingsApplied"], 4);
        assert!(json["diagnostics"].as_array().unwrap().is_empty());
    }
}
