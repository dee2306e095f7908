use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::db::repo::JobLogEntry;
use crate::error::AppError;

const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    pub job: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEntryDto {
    pub run_id: String,
    pub job: String,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<JobLogEntry> for JobEntryDto {
    fn from(entry: JobLogEntry) -> Self {
        JobEntryDto {
            run_id: entry.run_id,
            job: entry.job,
            started_at: entry.started_at,
            message: entry.message,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsResponse {
    pub jobs: Vec<JobEntryDto>,
}

/// Recent import/match/profit runs, newest first.
pub async fn list_jobs(
    Query(params): Query<JobsQuery>,
    State(state): State<AppState>,
) -> Result<Json<JobsResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let entries = state
        .repo
        .recent_job_entries(params.job.as_deref(), limit)
        .await?;
    Ok(Json(JobsResponse {
        jobs: entries.into_iter().map(JobEntryDto::from).collect(),
    }))
}
