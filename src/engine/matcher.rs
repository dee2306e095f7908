//! The backlog matcher: folds unprocessed transactions into trade aggregates.

use crate::domain::{PositionEffect, Transaction};
use crate::engine::diagnostics::{Diagnostic, MatchReport};
use crate::engine::{aggregate, bounded, EngineError};
use crate::store::{DeltaOutcome, FetchedTransaction, Ledger, OpeningOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Processes the unprocessed-transaction backlog to completion.
///
/// The matcher never skips ahead: every page re-queries the unprocessed set
/// from the start, and bulk-marking the previous page is what advances the
/// cursor. A run interrupted between applying a page and marking it leaves
/// only work the store's duplicate preconditions will absorb on the next run.
pub struct Matcher {
    ledger: Arc<dyn Ledger>,
    store_timeout: Duration,
}

impl Matcher {
    pub fn new(ledger: Arc<dyn Ledger>, store_timeout: Duration) -> Self {
        Self {
            ledger,
            store_timeout,
        }
    }

    /// Match the entire backlog, `page_size` transactions at a time.
    ///
    /// # Errors
    /// Fails on store outage or timeout, leaving the in-flight page unmarked.
    pub async fn run(&self, page_size: u32) -> Result<MatchReport, EngineError> {
        let started = Instant::now();
        let mut report = MatchReport {
            run_id: Uuid::new_v4(),
            pages: 0,
            transactions_processed: 0,
            trades_opened: 0,
            closings_applied: 0,
            diagnostics: Vec::new(),
            elapsed_ms: 0,
        };

        info!(run_id = %report.run_id, page_size, "starting matcher run");
        bounded(self.store_timeout, self.ledger.ensure_indexes()).await?;

        loop {
            let page = bounded(
                self.store_timeout,
                self.ledger.fetch_unprocessed_transactions(page_size),
            )
            .await?;
            if page.is_empty() {
                break;
            }
            report.pages += 1;

            let mut page_ids = Vec::with_capacity(page.len());
            for fetched in page {
                page_ids.push(fetched.id());
                match fetched {
                    FetchedTransaction::Parsed(tx) => self.apply(&tx, &mut report).await?,
                    FetchedTransaction::Malformed { id, detail } => {
                        warn!(id = id.as_i64(), %detail, "skipping malformed transaction");
                        report.diagnostics.push(Diagnostic::MalformedRecord {
                            id: id.as_i64(),
                            detail,
                        });
                    }
                }
            }

            let marked = bounded(self.store_timeout, self.ledger.mark_processed(&page_ids)).await?;
            report.transactions_processed += marked;
            debug!(
                run_id = %report.run_id,
                page = report.pages,
                marked,
                "page marked processed"
            );
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %report.run_id,
            pages = report.pages,
            transactions = report.transactions_processed,
            trades_opened = report.trades_opened,
            closings_applied = report.closings_applied,
            diagnostics = report.diagnostics.len(),
            elapsed_ms = report.elapsed_ms,
            "matcher run complete"
        );
        Ok(report)
    }

    async fn apply(&self, tx: &Transaction, report: &mut MatchReport) -> Result<(), EngineError> {
        match &tx.effect {
            PositionEffect::Opening => self.apply_opening(tx, report).await,
            PositionEffect::Closing => self.apply_closing(tx, report).await,
            PositionEffect::Other(raw) => {
                // Expirations, assignments, and the like: marked processed
                // without contributing a trade mutation.
                debug!(id = tx.id.as_i64(), effect = %raw, "no trade mutation for effect");
                Ok(())
            }
        }
    }

    async fn apply_opening(&self, tx: &Transaction, report: &mut MatchReport) -> Result<(), EngineError> {
        let trade = aggregate::build_opening_trade(tx);
        match bounded(self.store_timeout, self.ledger.insert_opening_trade(&trade)).await? {
            OpeningOutcome::Created(trade_id) => {
                report.trades_opened += 1;
                debug!(
                    id = tx.id.as_i64(),
                    symbol = tx.symbol.as_str(),
                    trade_id = trade_id.as_i64(),
                    "opened trade"
                );
            }
            OpeningOutcome::AlreadyApplied => {
                warn!(id = tx.id.as_i64(), "opening transaction already applied");
                report
                    .diagnostics
                    .push(Diagnostic::AlreadyApplied { id: tx.id.as_i64() });
            }
        }
        Ok(())
    }

    async fn apply_closing(&self, tx: &Transaction, report: &mut MatchReport) -> Result<(), EngineError> {
        let open_trade = bounded(
            self.store_timeout,
            self.ledger.find_oldest_open_trade(&tx.symbol),
        )
        .await?;

        let Some(open_trade) = open_trade else {
            // A resumed run may find no open trade because this very close
            // already went through and closed it; tell that apart from a
            // genuine orphan.
            if bounded(self.store_timeout, self.ledger.transaction_applied(tx.id)).await? {
                warn!(id = tx.id.as_i64(), "closing transaction already applied");
                report
                    .diagnostics
                    .push(Diagnostic::AlreadyApplied { id: tx.id.as_i64() });
            } else {
                warn!(
                    id = tx.id.as_i64(),
                    symbol = tx.symbol.as_str(),
                    "no open trade for closing transaction"
                );
                report.diagnostics.push(Diagnostic::UnmatchedClose {
                    id: tx.id.as_i64(),
                    symbol: tx.symbol.as_str().to_string(),
                });
            }
            return Ok(());
        };

        if tx.amount > open_trade.open_amount {
            warn!(
                id = tx.id.as_i64(),
                symbol = tx.symbol.as_str(),
                amount = %tx.amount,
                open_amount = %open_trade.open_amount,
                "closing amount exceeds remaining open quantity"
            );
            report.diagnostics.push(Diagnostic::ExcessiveClose {
                id: tx.id.as_i64(),
                symbol: tx.symbol.as_str().to_string(),
            });
        }

        let delta = aggregate::closing_delta(tx);
        match bounded(
            self.store_timeout,
            self.ledger.apply_trade_delta(open_trade.id, &delta),
        )
        .await?
        {
            DeltaOutcome::Applied => {
                report.closings_applied += 1;
                debug!(
                    id = tx.id.as_i64(),
                    trade_id = open_trade.id.as_i64(),
                    "applied closing transaction"
                );
            }
            DeltaOutcome::AlreadyApplied => {
                warn!(id = tx.id.as_i64(), "closing transaction already applied");
                report
                    .diagnostics
                    .push(Diagnostic::AlreadyApplied { id: tx.id.as_i64() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, Fees, Symbol, TimeMs, TradeLeg, TransactionId};
    use crate::store::{MemoryLedger, StoreError};
    use async_trait::async_trait;
    use std::str::FromStr;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn transaction(
        id: i64,
        symbol: &str,
        effect: PositionEffect,
        date: i64,
        amount: &str,
        cost: &str,
    ) -> Transaction {
        Transaction {
            id: TransactionId::new(id),
            symbol: Symbol::new(symbol.to_string()),
            underlying: Symbol::new(symbol.to_string()),
            put_call: None,
            effect,
            transaction_date: TimeMs::new(date),
            amount: dec(amount),
            cost: dec(cost),
            price: dec("1"),
            commission: dec("1.25"),
            fees: Fees {
                sec: dec("0.05"),
                ..Fees::default()
            },
        }
    }

    #[tokio::test]
    async fn test_full_round_trip_closes_trade() {
        let ledger = Arc::new(
            MemoryLedger::new()
                .with_transaction(transaction(
                    1,
                    "XYZ",
                    PositionEffect::Opening,
                    1000,
                    "10",
                    "-500",
                ))
                .with_transaction(transaction(
                    2,
                    "XYZ",
                    PositionEffect::Closing,
                    2000,
                    "10",
                    "600",
                )),
        );
        let matcher = Matcher::new(ledger.clone(), TIMEOUT);

        let report = matcher.run(100).await.unwrap();
        assert_eq!(report.trades_opened, 1);
        assert_eq!(report.closings_applied, 1);
        assert_eq!(report.transactions_processed, 2);
        assert!(report.diagnostics.is_empty());

        let trades = ledger.trades();
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert!(trade.is_closed());
        assert_eq!(trade.closing_date, TimeMs::new(2000));
        assert_eq!(trade.opening_transactions, vec![TradeLeg {
            id: TransactionId::new(1),
            amount: dec("10"),
        }]);
        assert_eq!(trade.closing_transactions, vec![TradeLeg {
            id: TransactionId::new(2),
            amount: dec("10"),
        }]);
    }

    #[tokio::test]
    async fn test_fifo_attaches_close_to_oldest_open_trade() {
        let ledger = Arc::new(
            MemoryLedger::new()
                .with_transaction(transaction(
                    1,
                    "XYZ",
                    PositionEffect::Opening,
                    1000,
                    "5",
                    "-250",
                ))
                .with_transaction(transaction(
                    2,
                    "XYZ",
                    PositionEffect::Opening,
                    2000,
                    "5",
                    "-260",
                ))
                .with_transaction(transaction(
                    3,
                    "XYZ",
                    PositionEffect::Closing,
                    3000,
                    "5",
                    "300",
                )),
        );
        let matcher = Matcher::new(ledger.clone(), TIMEOUT);

        matcher.run(100).await.unwrap();

        let trades = ledger.trades();
        assert_eq!(trades.len(), 2);
        let oldest = trades
            .iter()
            .find(|t| t.opening_date == TimeMs::new(1000))
            .unwrap();
        let newer = trades
            .iter()
            .find(|t| t.opening_date == TimeMs::new(2000))
            .unwrap();
        assert!(oldest.is_closed());
        assert_eq!(oldest.closing_transactions.len(), 1);
        assert!(newer.is_open());
        assert!(newer.closing_transactions.is_empty());
    }

    #[tokio::test]
    async fn test_orphan_close_reports_unmatched_and_still_marks() {
        let ledger = Arc::new(MemoryLedger::new().with_transaction(transaction(
            9,
            "ABC",
            PositionEffect::Closing,
            1000,
            "10",
            "600",
        )));
        let matcher = Matcher::new(ledger.clone(), TIMEOUT);

        let report = matcher.run(100).await.unwrap();
        assert!(ledger.trades().is_empty());
        assert_eq!(ledger.unprocessed_count(), 0);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::UnmatchedClose {
                id: 9,
                symbol: "ABC".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_other_effect_marked_without_trade_mutation() {
        let ledger = Arc::new(MemoryLedger::new().with_transaction(transaction(
            4,
            "XYZ",
            PositionEffect::Other("EXPIRATION".to_string()),
            1000,
            "10",
            "0",
        )));
        let matcher = Matcher::new(ledger.clone(), TIMEOUT);

        let report = matcher.run(100).await.unwrap();
        assert!(ledger.trades().is_empty());
        assert_eq!(ledger.unprocessed_count(), 0);
        assert_eq!(report.transactions_processed, 1);
        assert!(report.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_row_reported_and_marked() {
        let ledger = Arc::new(MemoryLedger::new().with_malformed(5, "invalid amount"));
        let matcher = Matcher::new(ledger.clone(), TIMEOUT);

        let report = matcher.run(100).await.unwrap();
        assert_eq!(ledger.unprocessed_count(), 0);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::MalformedRecord {
                id: 5,
                detail: "invalid amount".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_resumed_run_detects_already_applied_close() {
        // Crash simulation: the close was applied to a trade, but the crash
        // hit before the page was marked, so the transaction is re-presented.
        let opening = transaction(1, "XYZ", PositionEffect::Opening, 1000, "10", "-500");
        let closing = transaction(2, "XYZ", PositionEffect::Closing, 2000, "10", "600");

        let applied = crate::domain::Trade {
            id: crate::domain::TradeId::new(1),
            symbol: Symbol::new("XYZ".to_string()),
            underlying: Symbol::new("XYZ".to_string()),
            put_call: None,
            opening_date: TimeMs::new(1000),
            closing_date: TimeMs::new(2000),
            opening_price: dec("-500"),
            closing_price: dec("600"),
            open_amount: dec("0"),
            total_commission: dec("2.5"),
            total_fees: dec("0.1"),
            opening_transactions: vec![TradeLeg {
                id: opening.id,
                amount: dec("10"),
            }],
            closing_transactions: vec![TradeLeg {
                id: closing.id,
                amount: dec("10"),
            }],
            profit_dollars: None,
            profit_percent: None,
        };

        let ledger = Arc::new(
            MemoryLedger::new()
                .with_trade(applied.clone())
                .with_transaction(opening)
                .with_transaction(closing),
        );
        let matcher = Matcher::new(ledger.clone(), TIMEOUT);

        let report = matcher.run(100).await.unwrap();
        assert_eq!(report.trades_opened, 0);
        assert_eq!(report.closings_applied, 0);
        assert_eq!(report.diagnostics.len(), 2);
        assert!(report
            .diagnostics
            .iter()
            .all(|d| matches!(d, Diagnostic::AlreadyApplied { .. })));

        // The trade is untouched and the backlog is drained.
        assert_eq!(ledger.trades(), vec![applied]);
        assert_eq!(ledger.unprocessed_count(), 0);
    }

    #[tokio::test]
    async fn test_excessive_close_reported_but_still_applied() {
        let ledger = Arc::new(
            MemoryLedger::new()
                .with_transaction(transaction(
                    1,
                    "XYZ",
                    PositionEffect::Opening,
                    1000,
                    "4",
                    "-200",
                ))
                .with_transaction(transaction(
                    2,
                    "XYZ",
                    PositionEffect::Closing,
                    2000,
                    "10",
                    "600",
                )),
        );
        let matcher = Matcher::new(ledger.clone(), TIMEOUT);

        let report = matcher.run(100).await.unwrap();
        assert_eq!(report.closings_applied, 1);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::ExcessiveClose {
                id: 2,
                symbol: "XYZ".to_string(),
            }]
        );
        assert_eq!(ledger.trades()[0].open_amount, dec("-6"));
    }

    #[tokio::test]
    async fn test_store_outage_aborts_run() {
        let ledger = Arc::new(MemoryLedger::new().with_transaction(transaction(
            1,
            "XYZ",
            PositionEffect::Opening,
            1000,
            "10",
            "-500",
        )));
        ledger.set_failing(true);
        let matcher = Matcher::new(ledger.clone(), TIMEOUT);

        let err = matcher.run(100).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Unavailable(_))));
        // Nothing was marked; the next run retries the page.
        ledger.set_failing(false);
        assert_eq!(ledger.unprocessed_count(), 1);
    }

    #[derive(Debug)]
    struct HangingLedger;

    #[async_trait]
    impl Ledger for HangingLedger {
        async fn ensure_indexes(&self) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn fetch_unprocessed_transactions(
            &self,
            _page_size: u32,
        ) -> Result<Vec<FetchedTransaction>, StoreError> {
            std::future::pending().await
        }

        async fn mark_processed(&self, _ids: &[TransactionId]) -> Result<u64, StoreError> {
            std::future::pending().await
        }

        async fn insert_opening_trade(
            &self,
            _trade: &crate::domain::NewTrade,
        ) -> Result<OpeningOutcome, StoreError> {
            std::future::pending().await
        }

        async fn find_oldest_open_trade(
            &self,
            _symbol: &Symbol,
        ) -> Result<Option<crate::domain::Trade>, StoreError> {
            std::future::pending().await
        }

        async fn transaction_applied(&self, _id: TransactionId) -> Result<bool, StoreError> {
            std::future::pending().await
        }

        async fn apply_trade_delta(
            &self,
            _trade_id: crate::domain::TradeId,
            _delta: &crate::domain::TradeDelta,
        ) -> Result<DeltaOutcome, StoreError> {
            std::future::pending().await
        }

        async fn find_closed_unreconciled_trades(
            &self,
        ) -> Result<Vec<crate::domain::Trade>, StoreError> {
            std::future::pending().await
        }

        async fn bulk_reconcile_profits(
            &self,
            _updates: &[crate::store::ProfitUpdate],
        ) -> Result<u64, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_hung_store_times_out() {
        let matcher = Matcher::new(Arc::new(HangingLedger), Duration::from_millis(50));
        let err = matcher.run(100).await.unwrap_err();
        assert!(matches!(err, EngineError::StoreTimeout(_)));
    }

    #[tokio::test]
    async fn test_rerun_after_complete_run_is_identical() {
        let ledger = Arc::new(
            MemoryLedger::new()
                .with_transaction(transaction(
                    1,
                    "XYZ",
                    PositionEffect::Opening,
                    1000,
                    "10",
                    "-500",
                ))
                .with_transaction(transaction(
                    2,
                    "XYZ",
                    PositionEffect::Closing,
                    2000,
                    "10",
                    "600",
                )),
        );
        let matcher = Matcher::new(ledger.clone(), TIMEOUT);

        matcher.run(100).await.unwrap();
        let after_first = ledger.trades();

        let second = matcher.run(100).await.unwrap();
        assert_eq!(second.pages, 0);
        assert_eq!(second.transactions_processed, 0);
        assert_eq!(ledger.trades(), after_first);
    }
}
