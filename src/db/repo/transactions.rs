//! Transaction backlog and query operations for the repository.

use crate::domain::{
    Decimal, Fees, PositionEffect, PutCall, Symbol, TimeMs, Transaction, TransactionId,
};
use crate::store::FetchedTransaction;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use super::Repository;

/// A transaction row that could not be decoded into a domain value.
#[derive(Debug, Error)]
#[error("invalid {column}: {detail}")]
pub struct TransactionDecodeError {
    pub column: &'static str,
    pub detail: String,
}

impl Repository {
    /// Insert transactions idempotently, keyed by the broker-assigned id.
    ///
    /// Returns the number of newly inserted transactions (excludes
    /// duplicates).
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_transactions_batch(
        &self,
        transactions: &[Transaction],
    ) -> Result<usize, sqlx::Error> {
        if transactions.is_empty() {
            return Ok(0);
        }

        let imported_at = chrono::Utc::now().timestamp_millis();
        let mut total_inserted = 0usize;

        let mut tx = self.pool().begin().await?;

        for record in transactions {
            let result = sqlx::query(
                r#"
                INSERT INTO transactions (
                    id, symbol, underlying, put_call, position_effect,
                    transaction_date, amount, cost, price, commission,
                    optregfee, regfee, additionalfee, cdscfee, othercharges,
                    rfee, secfee, imported_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(record.id.as_i64())
            .bind(record.symbol.as_str())
            .bind(record.underlying.as_str())
            .bind(record.put_call.map(|pc| pc.as_str()))
            .bind(record.effect.as_str())
            .bind(record.transaction_date.as_i64())
            .bind(record.amount.to_canonical_string())
            .bind(record.cost.to_canonical_string())
            .bind(record.price.to_canonical_string())
            .bind(record.commission.to_canonical_string())
            .bind(record.fees.optreg.to_canonical_string())
            .bind(record.fees.reg.to_canonical_string())
            .bind(record.fees.additional.to_canonical_string())
            .bind(record.fees.cdsc.to_canonical_string())
            .bind(record.fees.other_charges.to_canonical_string())
            .bind(record.fees.r.to_canonical_string())
            .bind(record.fees.sec.to_canonical_string())
            .bind(imported_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Fetch up to `page_size` unprocessed transactions, oldest first.
    ///
    /// Rows that fail to decode are returned as
    /// [`FetchedTransaction::Malformed`] so the matcher can report them and
    /// still mark them processed.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn fetch_unprocessed(
        &self,
        page_size: u32,
    ) -> Result<Vec<FetchedTransaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, underlying, put_call, position_effect,
                   transaction_date, amount, cost, price, commission,
                   optregfee, regfee, additionalfee, cdscfee, othercharges,
                   rfee, secfee
            FROM transactions
            WHERE processed = 0
            ORDER BY transaction_date ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(page_size)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let id = TransactionId::new(row.get("id"));
                match decode_transaction(row) {
                    Ok(transaction) => FetchedTransaction::Parsed(transaction),
                    Err(err) => FetchedTransaction::Malformed {
                        id,
                        detail: err.to_string(),
                    },
                }
            })
            .collect())
    }

    /// Mark the given transactions processed, all-or-nothing.
    ///
    /// Returns the number of rows updated.
    ///
    /// # Errors
    /// Returns an error if the update fails; nothing is marked in that case.
    pub async fn mark_processed_bulk(&self, ids: &[TransactionId]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        // SQLite caps bind parameters per statement; chunking inside one
        // transaction keeps the page all-or-nothing.
        let mut tx = self.pool().begin().await?;
        let mut updated = 0u64;

        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE transactions SET processed = 1 WHERE id IN ({})",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.as_i64());
            }
            updated += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Get a transaction by its broker-assigned id.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row does not decode.
    pub async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, symbol, underlying, put_call, position_effect,
                   transaction_date, amount, cost, price, commission,
                   optregfee, regfee, additionalfee, cdscfee, othercharges,
                   rfee, secfee
            FROM transactions
            WHERE id = ?
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| decode_transaction(&r).map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .transpose()
    }

    /// Latest transactions, newest first.
    ///
    /// Undecodable rows are logged and skipped.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn latest_transactions(&self, limit: u32) -> Result<Vec<Transaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, underlying, put_call, position_effect,
                   transaction_date, amount, cost, price, commission,
                   optregfee, regfee, additionalfee, cdscfee, othercharges,
                   rfee, secfee
            FROM transactions
            ORDER BY transaction_date DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(decode_rows_lenient(&rows))
    }

    /// Transactions whose date falls in `[from_ms, to_ms)`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn transactions_in_window(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, underlying, put_call, position_effect,
                   transaction_date, amount, cost, price, commission,
                   optregfee, regfee, additionalfee, cdscfee, othercharges,
                   rfee, secfee
            FROM transactions
            WHERE transaction_date >= ? AND transaction_date < ?
            ORDER BY transaction_date ASC, id ASC
            "#,
        )
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(self.pool())
        .await?;

        Ok(decode_rows_lenient(&rows))
    }
}

fn decode_rows_lenient(rows: &[SqliteRow]) -> Vec<Transaction> {
    rows.iter()
        .filter_map(|row| match decode_transaction(row) {
            Ok(transaction) => Some(transaction),
            Err(err) => {
                let id: i64 = row.get("id");
                warn!(id, error = %err, "skipping undecodable transaction row");
                None
            }
        })
        .collect()
}

fn decimal_column(row: &SqliteRow, column: &'static str) -> Result<Decimal, TransactionDecodeError> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| TransactionDecodeError {
            column,
            detail: e.to_string(),
        })?;
    Decimal::from_str(&raw).map_err(|e| TransactionDecodeError {
        column,
        detail: format!("{} ({})", e, raw),
    })
}

fn decode_transaction(row: &SqliteRow) -> Result<Transaction, TransactionDecodeError> {
    let put_call = match row.get::<Option<String>, _>("put_call") {
        None => None,
        Some(raw) if raw.trim().is_empty() => None,
        Some(raw) => {
            let parsed = PutCall::parse(&raw);
            if parsed.is_none() {
                warn!(put_call = %raw, "unrecognized put/call value, treating as equity");
            }
            parsed
        }
    };

    Ok(Transaction {
        id: TransactionId::new(row.get("id")),
        symbol: Symbol::new(row.get("symbol")),
        underlying: Symbol::new(row.get("underlying")),
        put_call,
        effect: PositionEffect::parse(&row.get::<String, _>("position_effect")),
        transaction_date: TimeMs::new(row.get("transaction_date")),
        amount: decimal_column(row, "amount")?,
        cost: decimal_column(row, "cost")?,
        price: decimal_column(row, "price")?,
        commission: decimal_column(row, "commission")?,
        fees: Fees {
            optreg: decimal_column(row, "optregfee")?,
            reg: decimal_column(row, "regfee")?,
            additional: decimal_column(row, "additionalfee")?,
            cdsc: decimal_column(row, "cdscfee")?,
            other_charges: decimal_column(row, "othercharges")?,
            r: decimal_column(row, "rfee")?,
            sec: decimal_column(row, "secfee")?,
        },
    })
}
