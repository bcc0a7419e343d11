//! Storage ports
//!
//! Carts, orders and the read-only product catalog sit behind async traits so
//! the service runs against Postgres in production and the in-memory stores in
//! tests and local development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, Order};
use crate::domain::value_objects::{Money, OrderStatus, PaymentMethod};
use crate::Result;

/// Current catalog projection of one product. Prices read through here are
/// snapshots the moment they are captured; the catalog itself is never
/// written by this service.
#[derive(Clone, Debug)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Cart>>;
    /// Upserts the whole cart keyed by its user.
    async fn save(&self, cart: &Cart) -> Result<()>;
}

/// One row per day with the summed order totals, cancelled orders excluded.
#[derive(Clone, Debug, Serialize)]
pub struct DailySales {
    pub day: NaiveDate,
    pub total: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct MethodRevenue {
    pub method: PaymentMethod,
    pub total: Decimal,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order. A second order carrying an idempotency key that is
    /// already present is rejected with `Conflict`.
    async fn insert(&self, order: &Order) -> Result<()>;
    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>>;
    /// All orders for one user, newest first.
    async fn find_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;
    async fn find_by_checkout_key(&self, key: &str) -> Result<Option<Order>>;
    /// Persists an admin status change, returning the updated order.
    async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Option<Order>>;

    // Reporting reads for the admin summary.
    async fn count(&self) -> Result<u64>;
    async fn revenue_total(&self) -> Result<Decimal>;
    async fn recent(&self, limit: u32) -> Result<Vec<Order>>;
    async fn sales_by_day(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DailySales>>;
    async fn revenue_by_payment_method(&self) -> Result<Vec<MethodRevenue>>;
}
