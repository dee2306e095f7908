use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::domain::{Transaction, TransactionId};
use crate::error::AppError;
use crate::ingest;

const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: i64,
    pub symbol: String,
    pub underlying: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put_call: Option<String>,
    pub effect: String,
    pub transaction_date: i64,
    pub amount: String,
    pub cost: String,
    pub price: String,
    pub commission: String,
    pub total_fees: String,
}

impl From<&Transaction> for TransactionDto {
    fn from(tx: &Transaction) -> Self {
        TransactionDto {
            id: tx.id.as_i64(),
            symbol: tx.symbol.as_str().to_string(),
            underlying: tx.underlying.as_str().to_string(),
            put_call: tx.put_call.map(|pc| pc.as_str().to_string()),
            effect: tx.effect.as_str().to_string(),
            transaction_date: tx.transaction_date.as_i64(),
            amount: tx.amount.to_canonical_string(),
            cost: tx.cost.to_canonical_string(),
            price: tx.price.to_canonical_string(),
            commission: tx.commission.to_canonical_string(),
            total_fees: tx.total_fees().to_canonical_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionDto>,
}

/// Latest transactions, newest first.
pub async fn list_transactions(
    Query(params): Query<TransactionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let transactions = state.repo.latest_transactions(limit).await?;
    Ok(Json(TransactionsResponse {
        transactions: transactions.iter().map(TransactionDto::from).collect(),
    }))
}

/// One transaction by its broker-assigned id.
pub async fn transaction_by_id(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<TransactionDto>, AppError> {
    let transaction = state
        .repo
        .get_transaction(TransactionId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))?;
    Ok(Json(TransactionDto::from(&transaction)))
}

/// Transactions occurring on a `YYYY-MM-DD` UTC calendar day.
pub async fn transactions_by_day(
    Path(date): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let (from_ms, to_ms) = utc_day_window(&date)?;
    let transactions = state.repo.transactions_in_window(from_ms, to_ms).await?;
    Ok(Json(TransactionsResponse {
        transactions: transactions.iter().map(TransactionDto::from).collect(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub run_id: Uuid,
    pub received: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Import a brokerage transaction-export CSV.
///
/// Idempotent by broker id: re-importing a file inserts nothing new.
pub async fn import_transactions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ImportReport>, AppError> {
    let transactions = ingest::parse_transactions(&body)?;
    let received = transactions.len();
    let inserted = state.repo.insert_transactions_batch(&transactions).await?;

    let run_id = Uuid::new_v4();
    state
        .repo
        .append_job_entry(
            &run_id.to_string(),
            "import",
            &format!("imported {} of {} transactions", inserted, received),
        )
        .await?;

    Ok(Json(ImportReport {
        run_id,
        received,
        inserted,
        duplicates: received - inserted,
    }))
}

/// Millisecond window `[start, end)` covering one UTC calendar day.
pub(crate) fn utc_day_window(date: &str) -> Result<(i64, i64), AppError> {
    let day = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date: {}", date)))?;
    let next = day
        .succ_opt()
        .ok_or_else(|| AppError::BadRequest(format!("date out of range: {}", date)))?;

    let start_of = |d: chrono::NaiveDate| {
        d.and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc()
            .timestamp_millis()
    };
    Ok((start_of(day), start_of(next)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utc_day_window_spans_one_day() {
        let (from, to) = utc_day_window("2022-11-10").unwrap();
        assert_eq!(to - from, 24 * 60 * 60 * 1000);
        assert_eq!(from % 1000, 0);
    }

    #[test]
    fn test_utc_day_window_rejects_garbage() {
        assert!(utc_day_window("not-a-date").is_err());
        assert!(utc_day_window("2022-13-41").is_err());
    }
}
