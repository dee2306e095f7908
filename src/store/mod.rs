//! Store abstraction consumed by the matching engine.
//!
//! The engine never names SQL; it talks to a [`Ledger`], which owns both the
//! transaction backlog and the trade aggregates. The production
//! implementation is [`crate::db::Repository`]; [`MemoryLedger`] backs
//! engine-level tests without a database.

use crate::domain::{
    Decimal, NewTrade, Symbol, Trade, TradeDelta, TradeId, Transaction, TransactionId,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryLedger;

/// One row of the unprocessed backlog.
///
/// Rows that fail to decode still surface their id so the matcher can report
/// them and mark them processed instead of retrying them forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedTransaction {
    Parsed(Transaction),
    Malformed {
        id: TransactionId,
        detail: String,
    },
}

impl FetchedTransaction {
    /// Broker-assigned id, regardless of whether the row decoded.
    pub fn id(&self) -> TransactionId {
        match self {
            FetchedTransaction::Parsed(tx) => tx.id,
            FetchedTransaction::Malformed { id, .. } => *id,
        }
    }
}

/// Outcome of inserting a trade for an opening transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpeningOutcome {
    Created(TradeId),
    /// The opening transaction already owns a trade leg; nothing was written.
    AlreadyApplied,
}

/// Outcome of applying a closing delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied,
    /// The closing transaction already owns a trade leg; nothing was written.
    AlreadyApplied,
}

/// Profit figures for one fully closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitUpdate {
    pub trade_id: TradeId,
    pub dollars: Decimal,
    pub percent: Option<Decimal>,
}

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage contract for the matcher and the profit pass.
///
/// Implementations must make `insert_opening_trade` and `apply_trade_delta`
/// atomic, with the duplicate-transaction precondition enforced inside the
/// operation itself: a transaction id may own at most one leg across the
/// whole store, and a re-presented id reports `AlreadyApplied` instead of
/// mutating anything.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create the trade lookup indexes if they do not exist. Callable on
    /// every run.
    async fn ensure_indexes(&self) -> Result<(), StoreError>;

    /// Fetch up to `page_size` transactions not yet marked processed,
    /// ascending by transaction date.
    async fn fetch_unprocessed_transactions(
        &self,
        page_size: u32,
    ) -> Result<Vec<FetchedTransaction>, StoreError>;

    /// Mark the given transactions processed in one all-or-nothing batch.
    ///
    /// Returns the number of rows updated.
    async fn mark_processed(&self, ids: &[TransactionId]) -> Result<u64, StoreError>;

    /// Insert a new trade aggregate for an opening transaction.
    async fn insert_opening_trade(&self, trade: &NewTrade) -> Result<OpeningOutcome, StoreError>;

    /// The oldest trade for `symbol` still carrying positive open quantity.
    async fn find_oldest_open_trade(&self, symbol: &Symbol) -> Result<Option<Trade>, StoreError>;

    /// Whether the transaction already owns a leg in some trade.
    ///
    /// Used to tell a resumed duplicate apart from a genuinely orphaned
    /// close when no open trade resolves for its symbol.
    async fn transaction_applied(&self, id: TransactionId) -> Result<bool, StoreError>;

    /// Apply a closing delta to the given trade as one atomic operation.
    async fn apply_trade_delta(
        &self,
        trade_id: TradeId,
        delta: &TradeDelta,
    ) -> Result<DeltaOutcome, StoreError>;

    /// Fully closed trades (`open_amount == 0`) with no recorded profit.
    async fn find_closed_unreconciled_trades(&self) -> Result<Vec<Trade>, StoreError>;

    /// Write profit figures for the given trades in one atomic batch.
    ///
    /// Returns the number of trades modified.
    async fn bulk_reconcile_profits(&self, updates: &[ProfitUpdate]) -> Result<u64, StoreError>;
}
