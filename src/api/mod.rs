pub mod health;
pub mod jobs;
pub mod matching;
pub mod trades;
pub mod transactions;

use crate::config::Config;
use crate::db::Repository;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/transactions", get(transactions::list_transactions))
        .route(
            "/v1/transactions/import",
            post(transactions::import_transactions),
        )
        .route(
            "/v1/transactions/daily/:date",
            get(transactions::transactions_by_day),
        )
        .route("/v1/transactions/:id", get(transactions::transaction_by_id))
        .route("/v1/trades", get(trades::list_trades))
        .route("/v1/trades/closed", get(trades::closed_trades))
        .route("/v1/trades/:id", get(trades::trade_by_id))
        .route("/v1/matching/run", post(matching::run_matching))
        .route("/v1/matching/profits", post(matching::run_profits))
        .route("/v1/jobs", get(jobs::list_jobs))
        .layer(cors)
        .with_state(state)
}
