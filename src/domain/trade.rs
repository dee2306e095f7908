//! Trade aggregates: round-trip positions assembled by the matcher.

use crate::domain::{Decimal, PutCall, Symbol, TimeMs, TransactionId};

/// Store-assigned trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeId(pub i64);

impl TradeId {
    pub fn new(id: i64) -> Self {
        TradeId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One transaction's contribution to a trade: its id and matched quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeLeg {
    pub id: TransactionId,
    pub amount: Decimal,
}

/// A round-trip position: one opening transaction plus the closing
/// transactions matched against it so far.
///
/// Invariant: `open_amount` equals the opening leg amount minus the sum of
/// closing leg amounts. The trade is open while `open_amount > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: Symbol,
    pub underlying: Symbol,
    pub put_call: Option<PutCall>,
    pub opening_date: TimeMs,
    /// `TimeMs::ZERO` until the first closing transaction is applied; the
    /// latest closing transaction's date thereafter.
    pub closing_date: TimeMs,
    pub opening_price: Decimal,
    /// Accumulated cost across closing transactions.
    pub closing_price: Decimal,
    /// Remaining unmatched quantity.
    pub open_amount: Decimal,
    pub total_commission: Decimal,
    pub total_fees: Decimal,
    pub opening_transactions: Vec<TradeLeg>,
    pub closing_transactions: Vec<TradeLeg>,
    /// Set by the profit pass once the trade is fully closed.
    pub profit_dollars: Option<Decimal>,
    /// Unset for degenerate trades with a zero opening price.
    pub profit_percent: Option<Decimal>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.open_amount.is_positive()
    }

    pub fn is_closed(&self) -> bool {
        self.open_amount.is_zero()
    }
}

/// A trade aggregate built from an opening transaction, before the store has
/// assigned it an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrade {
    pub symbol: Symbol,
    pub underlying: Symbol,
    pub put_call: Option<PutCall>,
    pub opening_date: TimeMs,
    pub opening_price: Decimal,
    pub open_amount: Decimal,
    pub total_commission: Decimal,
    pub total_fees: Decimal,
    pub opening_leg: TradeLeg,
}

/// Incremental update a closing transaction applies to its trade.
///
/// All monetary fields are increments except `closing_date`, which overwrites
/// (the latest close wins). `leg.amount` is subtracted from the trade's
/// `open_amount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeDelta {
    pub closing_date: TimeMs,
    pub closing_price: Decimal,
    pub total_commission: Decimal,
    pub total_fees: Decimal,
    pub leg: TradeLeg,
}
