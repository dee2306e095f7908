//! Trade aggregate operations for the repository.

use crate::domain::{
    Decimal, NewTrade, PutCall, Symbol, TimeMs, Trade, TradeDelta, TradeId, TradeLeg,
    TransactionId,
};
use crate::store::{DeltaOutcome, OpeningOutcome, ProfitUpdate};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;

use super::Repository;

const TRADE_COLUMNS: &str = "id, symbol, underlying, put_call, opening_date, closing_date, \
     opening_price, closing_price, open_amount, total_commission, total_fees, \
     profit_dollars, profit_percent";

impl Repository {
    /// Create the trade lookup indexes if missing. Safe to call on every run.
    ///
    /// # Errors
    /// Returns an error if index creation fails.
    pub async fn ensure_trade_indexes(&self) -> Result<(), sqlx::Error> {
        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades (symbol)",
            "CREATE INDEX IF NOT EXISTS idx_trades_opening_date ON trades (opening_date)",
            "CREATE INDEX IF NOT EXISTS idx_trades_closing_date ON trades (closing_date)",
        ] {
            sqlx::query(statement).execute(self.pool()).await?;
        }
        Ok(())
    }

    /// Insert a trade aggregate for an opening transaction.
    ///
    /// The opening leg's UNIQUE transaction id doubles as the duplicate
    /// guard: if the leg already exists the whole insert rolls back and
    /// `AlreadyApplied` is reported.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; nothing is written then.
    pub async fn create_trade(&self, trade: &NewTrade) -> Result<OpeningOutcome, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO trades (
                symbol, underlying, put_call, opening_date, closing_date,
                opening_price, closing_price, open_amount,
                total_commission, total_fees
            ) VALUES (?, ?, ?, ?, 0, ?, '0', ?, ?, ?)
            "#,
        )
        .bind(trade.symbol.as_str())
        .bind(trade.underlying.as_str())
        .bind(trade.put_call.map(|pc| pc.as_str()))
        .bind(trade.opening_date.as_i64())
        .bind(trade.opening_price.to_canonical_string())
        .bind(trade.open_amount.to_canonical_string())
        .bind(trade.total_commission.to_canonical_string())
        .bind(trade.total_fees.to_canonical_string())
        .execute(&mut *tx)
        .await?;

        let trade_id = inserted.last_insert_rowid();

        let leg = sqlx::query(
            r#"
            INSERT INTO trade_legs (trade_id, transaction_id, role, amount, applied_at)
            VALUES (?, ?, 'opening', ?, ?)
            ON CONFLICT(transaction_id) DO NOTHING
            "#,
        )
        .bind(trade_id)
        .bind(trade.opening_leg.id.as_i64())
        .bind(trade.opening_leg.amount.to_canonical_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        if leg.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(OpeningOutcome::AlreadyApplied);
        }

        tx.commit().await?;
        Ok(OpeningOutcome::Created(TradeId::new(trade_id)))
    }

    /// The oldest trade for `symbol` still carrying positive open quantity.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn oldest_open_trade(&self, symbol: &Symbol) -> Result<Option<Trade>, sqlx::Error> {
        // open_amount is canonical decimal text; the REAL cast is exact for
        // the sign tests used here.
        let sql = format!(
            r#"
            SELECT {TRADE_COLUMNS}
            FROM trades
            WHERE symbol = ? AND CAST(open_amount AS REAL) > 0
            ORDER BY opening_date ASC, id ASC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(symbol.as_str())
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let trade = decode_trade(&row);
                Ok(Some(self.attach_legs_one(trade).await?))
            }
            None => Ok(None),
        }
    }

    /// Whether the transaction already owns a leg in some trade.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn is_transaction_applied(&self, id: TransactionId) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM trade_legs WHERE transaction_id = ? LIMIT 1")
            .bind(id.as_i64())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    /// Get a trade with its legs by store id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_trade(&self, id: TradeId) -> Result<Option<Trade>, sqlx::Error> {
        let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let trade = decode_trade(&row);
                Ok(Some(self.attach_legs_one(trade).await?))
            }
            None => Ok(None),
        }
    }

    /// Apply a closing delta to a trade as one atomic store operation.
    ///
    /// The leg insert is the transaction's first statement, so the write lock
    /// is held before the aggregate read-back, and its UNIQUE constraint is
    /// the duplicate guard.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; nothing is written then.
    pub async fn apply_closing_delta(
        &self,
        trade_id: TradeId,
        delta: &TradeDelta,
    ) -> Result<DeltaOutcome, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let leg = sqlx::query(
            r#"
            INSERT INTO trade_legs (trade_id, transaction_id, role, amount, applied_at)
            VALUES (?, ?, 'closing', ?, ?)
            ON CONFLICT(transaction_id) DO NOTHING
            "#,
        )
        .bind(trade_id.as_i64())
        .bind(delta.leg.id.as_i64())
        .bind(delta.leg.amount.to_canonical_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        if leg.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(DeltaOutcome::AlreadyApplied);
        }

        let row = sqlx::query(
            r#"
            SELECT closing_price, total_commission, total_fees, open_amount
            FROM trades
            WHERE id = ?
            "#,
        )
        .bind(trade_id.as_i64())
        .fetch_one(&mut *tx)
        .await?;

        let closing_price = decimal_or_zero(&row, "closing_price") + delta.closing_price;
        let total_commission = decimal_or_zero(&row, "total_commission") + delta.total_commission;
        let total_fees = decimal_or_zero(&row, "total_fees") + delta.total_fees;
        let open_amount = decimal_or_zero(&row, "open_amount") - delta.leg.amount;

        sqlx::query(
            r#"
            UPDATE trades
            SET closing_date = ?, closing_price = ?, total_commission = ?,
                total_fees = ?, open_amount = ?
            WHERE id = ?
            "#,
        )
        .bind(delta.closing_date.as_i64())
        .bind(closing_price.to_canonical_string())
        .bind(total_commission.to_canonical_string())
        .bind(total_fees.to_canonical_string())
        .bind(open_amount.to_canonical_string())
        .bind(trade_id.as_i64())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DeltaOutcome::Applied)
    }

    /// Fully closed trades with no recorded profit, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn closed_unreconciled_trades(&self) -> Result<Vec<Trade>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {TRADE_COLUMNS}
            FROM trades
            WHERE CAST(open_amount AS REAL) = 0 AND profit_dollars IS NULL
            ORDER BY id ASC
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        self.attach_legs(rows.iter().map(decode_trade).collect())
            .await
    }

    /// Write profit figures for the given trades in one store transaction.
    ///
    /// Returns the number of trades modified.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; no partial batch persists.
    pub async fn write_profits(&self, updates: &[ProfitUpdate]) -> Result<u64, sqlx::Error> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;
        let mut modified = 0u64;

        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE trades SET profit_dollars = ?, profit_percent = ?
                WHERE id = ?
                "#,
            )
            .bind(update.dollars.to_canonical_string())
            .bind(update.percent.map(|p| p.to_canonical_string()))
            .bind(update.trade_id.as_i64())
            .execute(&mut *tx)
            .await?;
            modified += result.rows_affected();
        }

        tx.commit().await?;
        Ok(modified)
    }

    /// List trades, newest opening first, optionally filtered by symbol.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_trades(
        &self,
        symbol: Option<&Symbol>,
        limit: u32,
    ) -> Result<Vec<Trade>, sqlx::Error> {
        let (sql, binds_symbol) = if symbol.is_some() {
            (
                format!(
                    r#"
                    SELECT {TRADE_COLUMNS}
                    FROM trades
                    WHERE symbol = ?
                    ORDER BY opening_date DESC, id DESC
                    LIMIT ?
                    "#
                ),
                true,
            )
        } else {
            (
                format!(
                    r#"
                    SELECT {TRADE_COLUMNS}
                    FROM trades
                    ORDER BY opening_date DESC, id DESC
                    LIMIT ?
                    "#
                ),
                false,
            )
        };

        let mut query = sqlx::query(&sql);
        if binds_symbol {
            query = query.bind(symbol.expect("binds_symbol implies symbol is Some").as_str());
        }
        query = query.bind(limit);

        let rows = query.fetch_all(self.pool()).await?;
        self.attach_legs(rows.iter().map(decode_trade).collect())
            .await
    }

    /// Trades closed within `[from_ms, to_ms)`.
    ///
    /// The zero closing-date sentinel never matches because `from_ms` is a
    /// real date.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn closed_trades_between(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Trade>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {TRADE_COLUMNS}
            FROM trades
            WHERE closing_date != 0 AND closing_date >= ? AND closing_date < ?
            ORDER BY closing_date ASC, id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(from_ms)
            .bind(to_ms)
            .fetch_all(self.pool())
            .await?;
        self.attach_legs(rows.iter().map(decode_trade).collect())
            .await
    }

    async fn attach_legs_one(&self, trade: Trade) -> Result<Trade, sqlx::Error> {
        let mut trades = self.attach_legs(vec![trade]).await?;
        Ok(trades.remove(0))
    }

    /// Populate the leg lists of the given trades.
    ///
    /// Chunked so large selections stay under SQLite's bind parameter cap.
    async fn attach_legs(&self, mut trades: Vec<Trade>) -> Result<Vec<Trade>, sqlx::Error> {
        if trades.is_empty() {
            return Ok(trades);
        }

        let trade_ids: Vec<i64> = trades.iter().map(|t| t.id.as_i64()).collect();
        let mut by_trade: HashMap<i64, (Vec<TradeLeg>, Vec<TradeLeg>)> = HashMap::new();

        for chunk in trade_ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                r#"
                SELECT trade_id, transaction_id, role, amount
                FROM trade_legs
                WHERE trade_id IN ({})
                ORDER BY id ASC
                "#,
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            let rows = query.fetch_all(self.pool()).await?;

            for row in rows {
                let trade_id: i64 = row.get("trade_id");
                let role: String = row.get("role");
                let leg = TradeLeg {
                    id: TransactionId::new(row.get("transaction_id")),
                    amount: decimal_or_zero(&row, "amount"),
                };
                let entry = by_trade.entry(trade_id).or_default();
                if role == "opening" {
                    entry.0.push(leg);
                } else {
                    entry.1.push(leg);
                }
            }
        }

        for trade in &mut trades {
            if let Some((opening, closing)) = by_trade.remove(&trade.id.as_i64()) {
                trade.opening_transactions = opening;
                trade.closing_transactions = closing;
            }
        }
        Ok(trades)
    }
}

/// Parse a decimal column written by this repository.
///
/// These columns only ever hold canonical strings we wrote ourselves; a parse
/// failure is logged and zeroed rather than failing the whole read.
fn decimal_or_zero(row: &SqliteRow, column: &str) -> Decimal {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).unwrap_or_else(|e| {
        warn!(column, value = %raw, error = %e, "failed to parse stored decimal, using zero");
        Decimal::zero()
    })
}

fn decode_trade(row: &SqliteRow) -> Trade {
    let put_call = row
        .get::<Option<String>, _>("put_call")
        .as_deref()
        .and_then(PutCall::parse);

    let profit_dollars = row
        .get::<Option<String>, _>("profit_dollars")
        .and_then(|s| Decimal::from_str(&s).ok());
    let profit_percent = row
        .get::<Option<String>, _>("profit_percent")
        .and_then(|s| Decimal::from_str(&s).ok());

    Trade {
        id: TradeId::new(row.get("id")),
        symbol: Symbol::new(row.get("symbol")),
        underlying: Symbol::new(row.get("underlying")),
        put_call,
        opening_date: TimeMs::new(row.get("opening_date")),
        closing_date: TimeMs::new(row.get("closing_date")),
        opening_price: decimal_or_zero(row, "opening_price"),
        closing_price: decimal_or_zero(row, "closing_price"),
        open_amount: decimal_or_zero(row, "open_amount"),
        total_commission: decimal_or_zero(row, "total_commission"),
        total_fees: decimal_or_zero(row, "total_fees"),
        opening_transactions: Vec::new(),
        closing_transactions: Vec::new(),
        profit_dollars,
        profit_percent,
    }
}
