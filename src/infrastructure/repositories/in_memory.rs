//! In-memory repository implementations. Used by tests and as a fallback
//! when no database is configured; both preserve insertion order.

use crate::domain::ports::{OrderRepository, SignalPerformanceRepository};
use crate::domain::signal::SignalPerformance;
use crate::domain::trading::types::Order;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<Vec<Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &Order) -> Result<()> {
        self.orders.lock().await.push(order.clone());
        Ok(())
    }

    async fn history(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let orders = self.orders.lock().await;
        Ok(match symbol {
            Some(symbol) => orders
                .iter()
                .filter(|o| o.symbol == symbol)
                .cloned()
                .collect(),
            None => orders.clone(),
        })
    }
}

#[derive(Default)]
pub struct InMemorySignalPerformanceRepository {
    records: Mutex<Vec<SignalPerformance>>,
}

impl InMemorySignalPerformanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalPerformanceRepository for InMemorySignalPerformanceRepository {
    async fn record(&self, performance: &SignalPerformance) -> Result<()> {
        self.records.lock().await.push(performance.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<SignalPerformance>> {
        Ok(self.records.lock().await.clone())
    }

    async fn for_symbol(&self, symbol: &str) -> Result<Vec<SignalPerformance>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.symbol == symbol)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::{
        Exchange, OrderSide, OrderStatus, OrderType,
    };
    use rust_decimal_macros::dec;

    fn order(symbol: &str, id: &str) -> Order {
        Order {
            order_id: id.to_string(),
            client_order_id: format!("c-{}", id),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: dec!(1),
            executed_qty: dec!(1),
            price: None,
            status: OrderStatus::Filled,
            exchange: Exchange::Bybit,
            strategy_name: "test".to_string(),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_history_preserves_insertion_order() {
        let repo = InMemoryOrderRepository::new();
        repo.save(&order("BTCUSDT", "1")).await.unwrap();
        repo.save(&order("ETHUSDT", "2")).await.unwrap();
        repo.save(&order("BTCUSDT", "3")).await.unwrap();

        let all = repo.history(None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        let btc = repo.history(Some("BTCUSDT")).await.unwrap();
        let ids: Vec<_> = btc.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
