//! Pure construction of trade aggregates from transactions.
//!
//! These functions own the fee totaling and field mapping; all persistence
//! semantics (atomicity, duplicate detection) live behind the store contract.

use crate::domain::{NewTrade, TimeMs, TradeDelta, TradeLeg, Transaction};

/// Build a fresh trade aggregate from an opening transaction.
///
/// The trade starts with the opening fill's full quantity unmatched and no
/// closing legs; its closing date stays at the zero sentinel until a close
/// arrives.
pub fn build_opening_trade(tx: &Transaction) -> NewTrade {
    NewTrade {
        symbol: tx.symbol.clone(),
        underlying: tx.underlying.clone(),
        put_call: tx.put_call,
        opening_date: tx.transaction_date,
        opening_price: tx.cost,
        open_amount: tx.amount,
        total_commission: tx.commission,
        total_fees: tx.total_fees(),
        opening_leg: TradeLeg {
            id: tx.id,
            amount: tx.amount,
        },
    }
}

/// Compute the incremental update a closing transaction applies to its trade.
///
/// Closing price accumulates the fill's total cost (`tx.cost`), not
/// `price * amount`; the latest close's date overwrites the trade's closing
/// date.
pub fn closing_delta(tx: &Transaction) -> TradeDelta {
    TradeDelta {
        closing_date: tx.transaction_date,
        closing_price: tx.cost,
        total_commission: tx.commission,
        total_fees: tx.total_fees(),
        leg: TradeLeg {
            id: tx.id,
            amount: tx.amount,
        },
    }
}

/// True when a closing date still holds the zero "never closed" sentinel.
pub fn is_unclosed_sentinel(closing_date: TimeMs) -> bool {
    closing_date.is_zero()
}
