//! Parsing brokerage transaction-export CSV files.
//!
//! Exports carry one row per fill with the broker's lowercase column names.
//! Parsing is strict: a bad row rejects the whole file with its row number,
//! so a partial import never slips through silently.

use crate::domain::{
    Decimal, Fees, PositionEffect, PutCall, Symbol, TimeMs, Transaction, TransactionId,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: invalid {column}: {detail}")]
    InvalidField {
        row: usize,
        column: &'static str,
        detail: String,
    },
}

/// One raw CSV row; monetary columns stay strings until parsed losslessly.
#[derive(Debug, Deserialize)]
struct CsvRow {
    id: i64,
    symbol: String,
    underlying: String,
    #[serde(default)]
    putcall: Option<String>,
    positioneffect: String,
    transactiondate: i64,
    amount: String,
    cost: String,
    price: String,
    commission: String,
    optregfee: String,
    regfee: String,
    additionalfee: String,
    cdscfee: String,
    othercharges: String,
    rfee: String,
    secfee: String,
}

/// Parse a transaction-export CSV into domain transactions.
///
/// # Errors
/// Fails on the first row that does not parse, identifying the row and
/// column.
pub fn parse_transactions(data: &[u8]) -> Result<Vec<Transaction>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut transactions = Vec::new();
    for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
        // Row numbers are 1-based and count the header line.
        let row = index + 2;
        let raw = record?;

        let decimal = |column: &'static str, value: &str| {
            Decimal::from_str_canonical(value).map_err(|e| IngestError::InvalidField {
                row,
                column,
                detail: format!("{} ({})", e, value),
            })
        };

        let put_call = match raw.putcall.as_deref() {
            None | Some("") => None,
            Some(value) => {
                Some(
                    PutCall::parse(value).ok_or_else(|| IngestError::InvalidField {
                        row,
                        column: "putcall",
                        detail: format!("expected CALL or PUT, got {}", value),
                    })?,
                )
            }
        };

        transactions.push(Transaction {
            id: TransactionId::new(raw.id),
            symbol: Symbol::new(raw.symbol),
            underlying: Symbol::new(raw.underlying),
            put_call,
            effect: PositionEffect::parse(&raw.positioneffect),
            transaction_date: TimeMs::new(raw.transactiondate),
            amount: decimal("amount", &raw.amount)?,
            cost: decimal("cost", &raw.cost)?,
            price: decimal("price", &raw.price)?,
            commission: decimal("commission", &raw.commission)?,
            fees: Fees {
                optreg: decimal("optregfee", &raw.optregfee)?,
                reg: decimal("regfee", &raw.regfee)?,
                additional: decimal("additionalfee", &raw.additionalfee)?,
                cdsc: decimal("cdscfee", &raw.cdscfee)?,
                other_charges: decimal("othercharges", &raw.othercharges)?,
                r: decimal("rfee", &raw.rfee)?,
                sec: decimal("secfee", &raw.secfee)?,
            },
        });
    }

    Ok(transactions)
}
