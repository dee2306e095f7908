//! Domain primitives: TransactionId, Symbol, TimeMs, PutCall, PositionEffect.

use serde::{Deserialize, Serialize};

/// Broker-assigned transaction identifier.
///
/// Unique across the transaction stream, but distinct from the store's
/// internal row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl TransactionId {
    pub fn new(id: i64) -> Self {
        TransactionId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instrument symbol, e.g. an option symbol or equity ticker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(symbol: String) -> Self {
        Symbol(symbol)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time in milliseconds since Unix epoch.
///
/// Trade closing dates use `TimeMs::ZERO` as the "still open" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub const ZERO: TimeMs = TimeMs(0);

    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Option contract right. Absent for equity transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PutCall {
    Call,
    Put,
}

impl PutCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            PutCall::Call => "CALL",
            PutCall::Put => "PUT",
        }
    }

    /// Parse the broker's representation; unknown values map to None.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" => Some(PutCall::Call),
            "PUT" => Some(PutCall::Put),
            _ => None,
        }
    }
}

impl std::fmt::Display for PutCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position effect of a fill.
///
/// Brokers emit values beyond OPENING/CLOSING; those are preserved verbatim
/// in `Other` so they can be reported instead of silently falling through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PositionEffect {
    Opening,
    Closing,
    Other(String),
}

impl PositionEffect {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "OPENING" => PositionEffect::Opening,
            "CLOSING" => PositionEffect::Closing,
            other => PositionEffect::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PositionEffect::Opening => "OPENING",
            PositionEffect::Closing => "CLOSING",
            PositionEffect::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for PositionEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_effect_parse() {
        assert_eq!(PositionEffect::parse("OPENING"), PositionEffect::Opening);
        assert_eq!(PositionEffect::parse("CLOSING"), PositionEffect::Closing);
        assert_eq!(
            PositionEffect::parse("EXPIRATION"),
            PositionEffect::Other("EXPIRATION".to_string())
        );
    }

    #[test]
    fn test_position_effect_roundtrip_preserves_raw() {
        let effect = PositionEffect::parse("ASSIGNMENT");
        assert_eq!(effect.as_str(), "ASSIGNMENT");
    }

    #[test]
    fn test_putcall_parse() {
        assert_eq!(PutCall::parse("CALL"), Some(PutCall::Call));
        assert_eq!(PutCall::parse("put"), Some(PutCall::Put));
        assert_eq!(PutCall::parse("STRADDLE"), None);
        assert_eq!(PutCall::parse(""), None);
    }

    #[test]
    fn test_timems_zero_sentinel() {
        assert!(TimeMs::ZERO.is_zero());
        assert!(!TimeMs::new(1668081600000).is_zero());
        assert!(TimeMs::new(1000) < TimeMs::new(2000));
    }

    #[test]
    fn test_transaction_id_display() {
        assert_eq!(TransactionId::new(48236719).to_string(), "48236719");
    }
}
