use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::transactions::utc_day_window;
use super::AppState;
use crate::domain::{Symbol, Trade, TradeId, TradeLeg};
use crate::engine::aggregate::is_unclosed_sentinel;
use crate::error::AppError;

const DEFAULT_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub symbol: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ClosedTradesQuery {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegDto {
    pub id: i64,
    pub amount: String,
}

impl From<&TradeLeg> for LegDto {
    fn from(leg: &TradeLeg) -> Self {
        LegDto {
            id: leg.id.as_i64(),
            amount: leg.amount.to_canonical_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDto {
    pub id: i64,
    pub symbol: String,
    pub underlying: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put_call: Option<String>,
    pub opening_date: i64,
    /// Absent while the trade still has open quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_date: Option<i64>,
    pub opening_price: String,
    pub closing_price: String,
    pub open_amount: String,
    pub total_commission: String,
    pub total_fees: String,
    pub opening_transactions: Vec<LegDto>,
    pub closing_transactions: Vec<LegDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_dollars: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_percent: Option<String>,
}

impl From<&Trade> for TradeDto {
    fn from(trade: &Trade) -> Self {
        TradeDto {
            id: trade.id.as_i64(),
            symbol: trade.symbol.as_str().to_string(),
            underlying: trade.underlying.as_str().to_string(),
            put_call: trade.put_call.map(|pc| pc.as_str().to_string()),
            opening_date: trade.opening_date.as_i64(),
            closing_date: if is_unclosed_sentinel(trade.closing_date) {
                None
            } else {
                Some(trade.closing_date.as_i64())
            },
            opening_price: trade.opening_price.to_canonical_string(),
            closing_price: trade.closing_price.to_canonical_string(),
            open_amount: trade.open_amount.to_canonical_string(),
            total_commission: trade.total_commission.to_canonical_string(),
            total_fees: trade.total_fees.to_canonical_string(),
            opening_transactions: trade.opening_transactions.iter().map(LegDto::from).collect(),
            closing_transactions: trade.closing_transactions.iter().map(LegDto::from).collect(),
            profit_dollars: trade.profit_dollars.map(|d| d.to_canonical_string()),
            profit_percent: trade.profit_percent.map(|d| d.to_canonical_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesResponse {
    pub trades: Vec<TradeDto>,
}

/// List trades, newest opening first, optionally filtered by symbol.
pub async fn list_trades(
    Query(params): Query<TradesQuery>,
    State(state): State<AppState>,
) -> Result<Json<TradesResponse>, AppError> {
    let symbol = match params.symbol.as_deref() {
        Some("") | None => None,
        Some(s) => Some(Symbol::new(s.to_string())),
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    let trades = state.repo.list_trades(symbol.as_ref(), limit).await?;
    Ok(Json(TradesResponse {
        trades: trades.iter().map(TradeDto::from).collect(),
    }))
}

/// One trade by its store id, with legs.
pub async fn trade_by_id(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<TradeDto>, AppError> {
    let trade = state
        .repo
        .get_trade(TradeId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("trade {}", id)))?;
    Ok(Json(TradeDto::from(&trade)))
}

/// Trades closed between two `YYYY-MM-DD` UTC dates, both inclusive.
pub async fn closed_trades(
    Query(params): Query<ClosedTradesQuery>,
    State(state): State<AppState>,
) -> Result<Json<TradesResponse>, AppError> {
    let (from_ms, _) = utc_day_window(&params.start)?;
    let (_, to_ms) = utc_day_window(&params.end)?;
    if from_ms >= to_ms {
        return Err(AppError::BadRequest(format!(
            "start {} is after end {}",
            params.start, params.end
        )));
    }

    let trades = state.repo.closed_trades_between(from_ms, to_ms).await?;
    Ok(Json(TradesResponse {
        trades: trades.iter().map(TradeDto::from).collect(),
    }))
}
