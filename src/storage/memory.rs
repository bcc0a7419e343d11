//! In-memory store implementations
//!
//! Same contracts as the Postgres implementations, backed by hash maps. Used
//! by the integration tests and for running the service without a database.
//! The cart store carries a fault toggle so tests can cut the clear step out
//! from under a checkout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, Order};
use crate::domain::value_objects::{OrderStatus, PaymentMethod};
use crate::storage::{
    CartStore, DailySales, MethodRevenue, OrderStore, ProductCatalog, ProductSnapshot,
};
use crate::{AppError, Result};

#[derive(Clone, Default)]
pub struct MemoryCatalog {
    products: Arc<RwLock<HashMap<Uuid, ProductSnapshot>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, product: ProductSnapshot) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn remove(&self, product_id: Uuid) {
        self.products.write().await.remove(&product_id);
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>> {
        Ok(self.products.read().await.get(&product_id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct MemoryCartStore {
    carts: Arc<RwLock<HashMap<Uuid, Cart>>>,
    fail_on_save: Arc<AtomicBool>,
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail until reset. Lets tests observe the
    /// window between order insert and cart clear.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.carts.read().await.get(&user_id).cloned())
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(AppError::Storage("injected cart save failure".into()));
        }
        self.carts.write().await.insert(cart.user_id(), cart.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|o| o.idempotency_key() == order.idempotency_key())
        {
            return Err(AppError::Conflict(
                "An order for this cart already exists.".into(),
            ));
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn find_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(found)
    }

    async fn find_by_checkout_key(&self, key: &str) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.idempotency_key() == key)
            .cloned())
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order_id) {
            Some(order) => {
                order.set_order_status(status);
                Ok(Some(order.clone()))
            }
            None => Ok(None),
        }
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.orders.read().await.len() as u64)
    }

    async fn revenue_total(&self) -> Result<Decimal> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| o.order_status() != OrderStatus::Cancelled)
            .map(|o| o.total().amount())
            .sum())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn sales_by_day(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailySales>> {
        let orders = self.orders.read().await;
        let mut by_day: HashMap<chrono::NaiveDate, Decimal> = HashMap::new();
        for order in orders.values() {
            if order.order_status() == OrderStatus::Cancelled {
                continue;
            }
            let created = order.created_at();
            if created < start || created > end {
                continue;
            }
            *by_day.entry(created.date_naive()).or_default() += order.total().amount();
        }
        let mut series: Vec<DailySales> = by_day
            .into_iter()
            .map(|(day, total)| DailySales { day, total })
            .collect();
        series.sort_by_key(|s| s.day);
        Ok(series)
    }

    async fn revenue_by_payment_method(&self) -> Result<Vec<MethodRevenue>> {
        let orders = self.orders.read().await;
        let mut by_method: HashMap<&'static str, (PaymentMethod, Decimal)> = HashMap::new();
        for order in orders.values() {
            if order.order_status() == OrderStatus::Cancelled {
                continue;
            }
            let method = order.payment_method();
            let entry = by_method.entry(method.as_str()).or_insert((method, Decimal::ZERO));
            entry.1 += order.total().amount();
        }
        let mut breakdown: Vec<MethodRevenue> = by_method
            .into_values()
            .map(|(method, total)| MethodRevenue { method, total })
            .collect();
        breakdown.sort_by_key(|m| m.method.as_str());
        Ok(breakdown)
    }
}
