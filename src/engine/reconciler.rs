//! Profit reconciliation for fully closed trades.

use crate::engine::diagnostics::{Diagnostic, ReconcileReport};
use crate::engine::{bounded, EngineError};
use crate::store::{Ledger, ProfitUpdate};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Computes realized profit for closed trades that have none recorded.
///
/// Opening cost and closing proceeds carry opposite signs upstream, so their
/// sum is the realized dollar profit. The pass is idempotent: once every
/// closed trade carries profit figures, a rerun selects nothing.
pub struct ProfitReconciler {
    ledger: Arc<dyn Ledger>,
    store_timeout: Duration,
}

impl ProfitReconciler {
    pub fn new(ledger: Arc<dyn Ledger>, store_timeout: Duration) -> Self {
        Self {
            ledger,
            store_timeout,
        }
    }

    /// Reconcile profits for the whole store in one batched write.
    ///
    /// # Errors
    /// Fails on store outage or timeout; no partial batch is written.
    pub async fn run(&self) -> Result<ReconcileReport, EngineError> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, "starting profit reconciliation");

        let trades = bounded(
            self.store_timeout,
            self.ledger.find_closed_unreconciled_trades(),
        )
        .await?;

        let mut diagnostics = Vec::new();
        let mut updates = Vec::with_capacity(trades.len());
        for trade in &trades {
            let dollars = trade.opening_price + trade.closing_price;
            let percent = if trade.opening_price.is_zero() {
                warn!(
                    trade_id = trade.id.as_i64(),
                    "zero opening price, leaving profit percent unset"
                );
                diagnostics.push(Diagnostic::DegenerateTrade {
                    trade_id: trade.id.as_i64(),
                });
                None
            } else {
                Some(dollars / trade.opening_price.abs())
            };
            updates.push(ProfitUpdate {
                trade_id: trade.id,
                dollars,
                percent,
            });
        }

        let modified = bounded(
            self.store_timeout,
            self.ledger.bulk_reconcile_profits(&updates),
        )
        .await?;

        let report = ReconcileReport {
            run_id,
            matched: trades.len() as u64,
            modified,
            diagnostics,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            %run_id,
            matched = report.matched,
            modified = report.modified,
            elapsed_ms = report.elapsed_ms,
            "profit reconciliation complete"
        );
        Ok(report)
    }
}
