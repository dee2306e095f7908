//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `transactions.rs` - backlog fetch/mark and transaction queries
//! - `trades.rs` - trade aggregates, legs, and profit reconciliation
//!
//! `Repository` also implements the engine's store contract
//! ([`crate::store::Ledger`]).

mod trades;
mod transactions;

use crate::domain::{NewTrade, Symbol, Trade, TradeDelta, TradeId, TransactionId};
use crate::store::{
    DeltaOutcome, FetchedTransaction, Ledger, OpeningOutcome, ProfitUpdate, StoreError,
};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// One row of the run journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLogEntry {
    pub run_id: String,
    pub job: String,
    pub started_at: i64,
    pub message: Option<String>,
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Job log operations
    // =========================================================================

    /// Record a run in the job journal.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn append_job_entry(
        &self,
        run_id: &str,
        job: &str,
        message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO job_log (run_id, job, started_at, message)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(job)
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch recent job journal entries, newest first, optionally filtered by
    /// job kind.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn recent_job_entries(
        &self,
        job: Option<&str>,
        limit: u32,
    ) -> Result<Vec<JobLogEntry>, sqlx::Error> {
        let (sql, binds_job) = if job.is_some() {
            (
                r#"
                SELECT run_id, job, started_at, message
                FROM job_log
                WHERE job = ?
                ORDER BY started_at DESC, id DESC
                LIMIT ?
                "#,
                true,
            )
        } else {
            (
                r#"
                SELECT run_id, job, started_at, message
                FROM job_log
                ORDER BY started_at DESC, id DESC
                LIMIT ?
                "#,
                false,
            )
        };

        let mut query = sqlx::query(sql);
        if binds_job {
            query = query.bind(job.expect("binds_job implies job is Some"));
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| JobLogEntry {
                run_id: row.get("run_id"),
                job: row.get("job"),
                started_at: row.get("started_at"),
                message: row.get("message"),
            })
            .collect())
    }
}

#[async_trait]
impl Ledger for Repository {
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        Ok(self.ensure_trade_indexes().await?)
    }

    async fn fetch_unprocessed_transactions(
        &self,
        page_size: u32,
    ) -> Result<Vec<FetchedTransaction>, StoreError> {
        Ok(self.fetch_unprocessed(page_size).await?)
    }

    async fn mark_processed(&self, ids: &[TransactionId]) -> Result<u64, StoreError> {
        Ok(self.mark_processed_bulk(ids).await?)
    }

    async fn insert_opening_trade(&self, trade: &NewTrade) -> Result<OpeningOutcome, StoreError> {
        Ok(self.create_trade(trade).await?)
    }

    async fn find_oldest_open_trade(&self, symbol: &Symbol) -> Result<Option<Trade>, StoreError> {
        Ok(self.oldest_open_trade(symbol).await?)
    }

    async fn transaction_applied(&self, id: TransactionId) -> Result<bool, StoreError> {
        Ok(self.is_transaction_applied(id).await?)
    }

    async fn apply_trade_delta(
        &self,
        trade_id: TradeId,
        delta: &TradeDelta,
    ) -> Result<DeltaOutcome, StoreError> {
        Ok(self.apply_closing_delta(trade_id, delta).await?)
    }

    async fn find_closed_unreconciled_trades(&self) -> Result<Vec<Trade>, StoreError> {
        Ok(self.closed_unreconciled_trades().await?)
    }

    async fn bulk_reconcile_profits(&self, updates: &[ProfitUpdate]) -> Result<u64, StoreError> {
        Ok(self.write_profits(updates).await?)
    }
}
