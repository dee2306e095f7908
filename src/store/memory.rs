//! In-memory ledger for exercising the engine without a database.

use super::{
    DeltaOutcome, FetchedTransaction, Ledger, OpeningOutcome, ProfitUpdate, StoreError,
};
use crate::domain::{
    NewTrade, Symbol, Trade, TradeDelta, TradeId, Transaction, TransactionId,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    backlog: Vec<BacklogEntry>,
    trades: Vec<Trade>,
    /// Transaction ids owning a leg somewhere in `trades`.
    applied: HashSet<TransactionId>,
    next_trade_id: i64,
}

#[derive(Debug, Clone)]
struct BacklogEntry {
    row: FetchedTransaction,
    processed: bool,
}

/// Ledger backed by process memory, mirroring the store semantics the
/// production repository implements in SQL.
///
/// `set_failing(true)` makes every operation report an outage, for tests of
/// the engine's abort behavior.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    failing: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transaction in the unprocessed backlog.
    pub fn with_transaction(self, tx: Transaction) -> Self {
        self.state.lock().unwrap().backlog.push(BacklogEntry {
            row: FetchedTransaction::Parsed(tx),
            processed: false,
        });
        self
    }

    /// Queue a row that will fail to decode.
    pub fn with_malformed(self, id: i64, detail: &str) -> Self {
        self.state.lock().unwrap().backlog.push(BacklogEntry {
            row: FetchedTransaction::Malformed {
                id: TransactionId::new(id),
                detail: detail.to_string(),
            },
            processed: false,
        });
        self
    }

    /// Seed an existing trade, registering its legs as applied.
    pub fn with_trade(self, trade: Trade) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for leg in trade
                .opening_transactions
                .iter()
                .chain(trade.closing_transactions.iter())
            {
                state.applied.insert(leg.id);
            }
            state.next_trade_id = state.next_trade_id.max(trade.id.as_i64());
            state.trades.push(trade);
        }
        self
    }

    /// Toggle the induced-outage switch.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all trades, for assertions.
    pub fn trades(&self) -> Vec<Trade> {
        self.state.lock().unwrap().trades.clone()
    }

    /// Number of backlog rows not yet marked processed.
    pub fn unprocessed_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .backlog
            .iter()
            .filter(|e| !e.processed)
            .count()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("induced outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn fetch_unprocessed_transactions(
        &self,
        page_size: u32,
    ) -> Result<Vec<FetchedTransaction>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let mut pending: Vec<&BacklogEntry> =
            state.backlog.iter().filter(|e| !e.processed).collect();
        pending.sort_by_key(|e| match &e.row {
            FetchedTransaction::Parsed(tx) => (tx.transaction_date.as_i64(), tx.id.as_i64()),
            FetchedTransaction::Malformed { id, .. } => (i64::MIN, id.as_i64()),
        });
        Ok(pending
            .into_iter()
            .take(page_size as usize)
            .map(|e| e.row.clone())
            .collect())
    }

    async fn mark_processed(&self, ids: &[TransactionId]) -> Result<u64, StoreError> {
        self.check_available()?;
        let id_set: HashSet<TransactionId> = ids.iter().copied().collect();
        let mut state = self.state.lock().unwrap();
        let mut marked = 0u64;
        for entry in state.backlog.iter_mut() {
            if !entry.processed && id_set.contains(&entry.row.id()) {
                entry.processed = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn insert_opening_trade(&self, trade: &NewTrade) -> Result<OpeningOutcome, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if !state.applied.insert(trade.opening_leg.id) {
            return Ok(OpeningOutcome::AlreadyApplied);
        }
        state.next_trade_id += 1;
        let id = TradeId::new(state.next_trade_id);
        state.trades.push(Trade {
            id,
            symbol: trade.symbol.clone(),
            underlying: trade.underlying.clone(),
            put_call: trade.put_call,
            opening_date: trade.opening_date,
            closing_date: crate::domain::TimeMs::ZERO,
            opening_price: trade.opening_price,
            closing_price: crate::domain::Decimal::zero(),
            open_amount: trade.open_amount,
            total_commission: trade.total_commission,
            total_fees: trade.total_fees,
            opening_transactions: vec![trade.opening_leg],
            closing_transactions: Vec::new(),
            profit_dollars: None,
            profit_percent: None,
        });
        Ok(OpeningOutcome::Created(id))
    }

    async fn find_oldest_open_trade(&self, symbol: &Symbol) -> Result<Option<Trade>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .trades
            .iter()
            .filter(|t| &t.symbol == symbol && t.is_open())
            .min_by_key(|t| (t.opening_date, t.id))
            .cloned())
    }

    async fn transaction_applied(&self, id: TransactionId) -> Result<bool, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state.applied.contains(&id))
    }

    async fn apply_trade_delta(
        &self,
        trade_id: TradeId,
        delta: &TradeDelta,
    ) -> Result<DeltaOutcome, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if !state.applied.insert(delta.leg.id) {
            return Ok(DeltaOutcome::AlreadyApplied);
        }
        let trade = state
            .trades
            .iter_mut()
            .find(|t| t.id == trade_id)
            .ok_or_else(|| StoreError::Unavailable(format!("no trade {}", trade_id)))?;
        trade.closing_date = delta.closing_date;
        trade.closing_price += delta.closing_price;
        trade.total_commission += delta.total_commission;
        trade.total_fees += delta.total_fees;
        trade.open_amount -= delta.leg.amount;
        trade.closing_transactions.push(delta.leg);
        Ok(DeltaOutcome::Applied)
    }

    async fn find_closed_unreconciled_trades(&self) -> Result<Vec<Trade>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .trades
            .iter()
            .filter(|t| t.is_closed() && t.profit_dollars.is_none())
            .cloned()
            .collect())
    }

    async fn bulk_reconcile_profits(&self, updates: &[ProfitUpdate]) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let mut modified = 0u64;
        for update in updates {
            if let Some(trade) = state.trades.iter_mut().find(|t| t.id == update.trade_id) {
                let dollars = Some(update.dollars);
                if trade.profit_dollars != dollars || trade.profit_percent != update.percent {
                    trade.profit_dollars = dollars;
                    trade.profit_percent = update.percent;
                    modified += 1;
                }
            }
        }
        Ok(modified)
    }
}
