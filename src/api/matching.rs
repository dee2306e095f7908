use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::AppState;
use crate::engine::{MatchReport, Matcher, ProfitReconciler, ReconcileReport};
use crate::error::AppError;
use crate::store::Ledger;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRunRequest {
    pub page_size: Option<u32>,
}

/// Trigger a full matcher run over the unprocessed backlog.
pub async fn run_matching(
    State(state): State<AppState>,
    body: Option<Json<MatchRunRequest>>,
) -> Result<Json<MatchReport>, AppError> {
    let page_size = body
        .and_then(|Json(req)| req.page_size)
        .unwrap_or(state.config.page_size);
    if page_size == 0 {
        return Err(AppError::BadRequest(
            "pageSize must be greater than zero".to_string(),
        ));
    }

    let ledger: Arc<dyn Ledger> = state.repo.clone();
    let matcher = Matcher::new(ledger, Duration::from_millis(state.config.store_timeout_ms));
    let report = matcher.run(page_size).await?;

    state
        .repo
        .append_job_entry(
            &report.run_id.to_string(),
            "match",
            &format!(
                "processed {} transactions over {} pages, opened {}, closed into {}",
                report.transactions_processed,
                report.pages,
                report.trades_opened,
                report.closings_applied
            ),
        )
        .await?;

    Ok(Json(report))
}

/// Trigger a profit reconciliation pass over closed trades.
pub async fn run_profits(
    State(state): State<AppState>,
) -> Result<Json<ReconcileReport>, AppError> {
    let ledger: Arc<dyn Ledger> = state.repo.clone();
    let reconciler =
        ProfitReconciler::new(ledger, Duration::from_millis(state.config.store_timeout_ms));
    let report = reconciler.run().await?;

    state
        .repo
        .append_job_entry(
            &report.run_id.to_string(),
            "profits",
            &format!(
                "reconciled {} of {} closed trades",
                report.modified, report.matched
            ),
        )
        .await?;

    Ok(Json(report))
}
