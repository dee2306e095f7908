pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, Fees, NewTrade, PositionEffect, PutCall, Symbol, TimeMs, Trade, TradeDelta, TradeId,
    TradeLeg, Transaction, TransactionId,
};
pub use engine::{Diagnostic, EngineError, MatchReport, Matcher, ProfitReconciler, ReconcileReport};
pub use error::AppError;
pub use store::{
    DeltaOutcome, FetchedTransaction, Ledger, MemoryLedger, OpeningOutcome, ProfitUpdate,
    StoreError,
};
