//! Domain types for the trade matching engine.
//!
//! This module provides:
//! - Lossless monetary arithmetic via a Decimal wrapper
//! - Domain primitives: TransactionId, Symbol, TimeMs, PutCall, PositionEffect
//! - Transaction records as ingested from a brokerage export
//! - Trade aggregates, legs, and the incremental closing delta

pub mod decimal;
pub mod primitives;
pub mod trade;
pub mod transaction;

pub use decimal::Decimal;
pub use primitives::{PositionEffect, PutCall, Symbol, TimeMs, TransactionId};
pub use trade::{NewTrade, Trade, TradeDelta, TradeId, TradeLeg};
pub use transaction::{Fees, Transaction};
