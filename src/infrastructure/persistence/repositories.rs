//! SQLite-backed repositories. Insertion order is preserved by the
//! autoincrement rowids.

use crate::domain::ports::{OrderRepository, SignalPerformanceRepository};
use crate::domain::signal::{SignalOutcome, SignalPerformance};
use crate::domain::trading::types::{
    Exchange, Order, OrderSide, OrderStatus, OrderType,
};
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;

pub struct SqliteOrderRepository {
    database: Database,
}

impl SqliteOrderRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn save(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                order_id, client_order_id, symbol, side, order_type,
                quantity, executed_qty, price, status, exchange,
                strategy_name, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.client_order_id)
        .bind(&order.symbol)
        .bind(order.side.to_string())
        .bind(order.order_type.to_string())
        .bind(order.quantity.to_string())
        .bind(order.executed_qty.to_string())
        .bind(order.price.map(|p| p.to_string()))
        .bind(order.status.to_string())
        .bind(order.exchange.to_string())
        .bind(&order.strategy_name)
        .bind(order.created_at)
        .execute(&self.database.pool)
        .await
        .context("Failed to persist order")?;
        Ok(())
    }

    async fn history(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        type Row = (
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            String,
            String,
            String,
            i64,
        );

        let rows: Vec<Row> = match symbol {
            Some(symbol) => {
                sqlx::query_as(
                    r#"
                    SELECT order_id, client_order_id, symbol, side, order_type,
                           quantity, executed_qty, price, status, exchange,
                           strategy_name, created_at
                    FROM orders WHERE symbol = $1 ORDER BY rowid_ord
                    "#,
                )
                .bind(symbol)
                .fetch_all(&self.database.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT order_id, client_order_id, symbol, side, order_type,
                           quantity, executed_qty, price, status, exchange,
                           strategy_name, created_at
                    FROM orders ORDER BY rowid_ord
                    "#,
                )
                .fetch_all(&self.database.pool)
                .await
            }
        }
        .context("Failed to load order history")?;

        Ok(rows
            .into_iter()
            .filter_map(
                |(
                    order_id,
                    client_order_id,
                    symbol,
                    side,
                    order_type,
                    quantity,
                    executed_qty,
                    price,
                    status,
                    exchange,
                    strategy_name,
                    created_at,
                )| {
                    Some(Order {
                        order_id,
                        client_order_id,
                        symbol,
                        side: OrderSide::from_str(&side).ok()?,
                        order_type: match order_type.as_str() {
                            "LIMIT" => OrderType::Limit,
                            _ => OrderType::Market,
                        },
                        quantity: Decimal::from_str(&quantity).ok()?,
                        executed_qty: Decimal::from_str(&executed_qty).unwrap_or(Decimal::ZERO),
                        price: price.and_then(|p| Decimal::from_str(&p).ok()),
                        status: match status.as_str() {
                            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
                            "FILLED" => OrderStatus::Filled,
                            "CANCELED" => OrderStatus::Canceled,
                            "REJECTED" => OrderStatus::Rejected,
                            _ => OrderStatus::New,
                        },
                        exchange: Exchange::from_str(&exchange).ok()?,
                        strategy_name,
                        created_at,
                    })
                },
            )
            .collect())
    }
}

pub struct SqliteSignalPerformanceRepository {
    database: Database,
}

impl SqliteSignalPerformanceRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn row_to_record(
        (signal_id, symbol, tier, outcome, technical_score, ai_confirmed, mtf_adjustment, recorded_at): (
            String,
            String,
            String,
            String,
            f64,
            i64,
            f64,
            i64,
        ),
    ) -> Option<SignalPerformance> {
        Some(SignalPerformance {
            signal_id,
            symbol,
            tier,
            outcome: match outcome.as_str() {
                "WIN" => SignalOutcome::Win,
                "LOSS" => SignalOutcome::Loss,
                "BREAKEVEN" => SignalOutcome::Breakeven,
                _ => return None,
            },
            technical_score,
            ai_confirmed: ai_confirmed != 0,
            mtf_adjustment,
            recorded_at,
        })
    }
}

#[async_trait]
impl SignalPerformanceRepository for SqliteSignalPerformanceRepository {
    async fn record(&self, performance: &SignalPerformance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_performance (
                signal_id, symbol, tier, outcome, technical_score,
                ai_confirmed, mtf_adjustment, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&performance.signal_id)
        .bind(&performance.symbol)
        .bind(&performance.tier)
        .bind(performance.outcome.to_string())
        .bind(performance.technical_score)
        .bind(performance.ai_confirmed as i64)
        .bind(performance.mtf_adjustment)
        .bind(performance.recorded_at)
        .execute(&self.database.pool)
        .await
        .context("Failed to record signal performance")?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<SignalPerformance>> {
        let rows: Vec<(String, String, String, String, f64, i64, f64, i64)> = sqlx::query_as(
            r#"
            SELECT signal_id, symbol, tier, outcome, technical_score,
                   ai_confirmed, mtf_adjustment, recorded_at
            FROM signal_performance ORDER BY rowid_perf
            "#,
        )
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to load signal performance")?;
        Ok(rows.into_iter().filter_map(Self::row_to_record).collect())
    }

    async fn for_symbol(&self, symbol: &str) -> Result<Vec<SignalPerformance>> {
        let rows: Vec<(String, String, String, String, f64, i64, f64, i64)> = sqlx::query_as(
            r#"
            SELECT signal_id, symbol, tier, outcome, technical_score,
                   ai_confirmed, mtf_adjustment, recorded_at
            FROM signal_performance WHERE symbol = $1 ORDER BY rowid_perf
            "#,
        )
        .bind(symbol)
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to load signal performance for symbol")?;
        Ok(rows.into_iter().filter_map(Self::row_to_record).collect())
    }
}
