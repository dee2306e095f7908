//! Transaction records as delivered by the brokerage export.

use crate::domain::{Decimal, PositionEffect, PutCall, Symbol, TimeMs, TransactionId};

/// The seven regulatory/exchange fee components reported per fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fees {
    pub optreg: Decimal,
    pub reg: Decimal,
    pub additional: Decimal,
    pub cdsc: Decimal,
    pub other_charges: Decimal,
    pub r: Decimal,
    pub sec: Decimal,
}

impl Fees {
    /// Sum of all seven fee components.
    pub fn total(&self) -> Decimal {
        self.optreg
            + self.reg
            + self.additional
            + self.cdsc
            + self.other_charges
            + self.r
            + self.sec
    }
}

/// A single brokerage fill, immutable once ingested.
///
/// The store-side `processed` flag is not part of this type; the matcher only
/// ever sees transactions the store still considers pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub symbol: Symbol,
    pub underlying: Symbol,
    pub put_call: Option<PutCall>,
    pub effect: PositionEffect,
    pub transaction_date: TimeMs,
    /// Signed quantity of contracts/shares.
    pub amount: Decimal,
    /// Total cost of the fill. Negative for debits, positive for credits.
    pub cost: Decimal,
    /// Per-unit price.
    pub price: Decimal,
    pub commission: Decimal,
    pub fees: Fees,
}

impl Transaction {
    /// Total of the seven fee components for this fill.
    pub fn total_fees(&self) -> Decimal {
        self.fees.total()
    }
}
