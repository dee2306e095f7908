//! The matching engine: backlog matcher, trade aggregate builder, and the
//! profit reconciliation pass.

pub mod aggregate;
pub mod diagnostics;
pub mod matcher;
pub mod reconciler;

pub use diagnostics::{Diagnostic, MatchReport, ReconcileReport};
pub use matcher::Matcher;
pub use reconciler::ProfitReconciler;

use crate::store::StoreError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Fatal failure of a matching or profit run.
///
/// The run aborts without marking the in-flight page; the next run retries it
/// and the store's duplicate preconditions absorb anything already applied.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("store operation timed out after {0:?}")]
    StoreTimeout(Duration),
}

/// Run a store operation under the per-operation deadline.
pub(crate) async fn bounded<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, EngineError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(EngineError::Store(err)),
        Err(_) => Err(EngineError::StoreTimeout(deadline)),
    }
}
