//! Postgres store implementations

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::cart::CartLine;
use crate::domain::aggregates::order::OrderLine;
use crate::domain::aggregates::{Cart, Order};
use crate::domain::value_objects::{Address, Money, OrderStatus, PaymentMethod, PaymentStatus};
use crate::storage::{
    CartStore, DailySales, MethodRevenue, OrderStore, ProductCatalog, ProductSnapshot,
};
use crate::{AppError, Result};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation))
}

fn corrupt(err: impl std::fmt::Display) -> AppError {
    AppError::Storage(format!("corrupt stored record: {err}"))
}

// =============================================================================
// Product catalog
// =============================================================================

#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    price: Decimal,
    currency: String,
}

#[async_trait]
impl ProductCatalog for PgCatalog {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, price, currency FROM products WHERE id = $1 AND status = 'active'",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ProductSnapshot {
            id: r.id,
            name: r.name,
            price: Money::new(r.price, &r.currency),
        }))
    }
}

// =============================================================================
// Cart store
// =============================================================================

#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    currency: String,
    items: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_cart(self) -> Result<Cart> {
        let items: Vec<CartLine> = serde_json::from_value(self.items).map_err(corrupt)?;
        Ok(Cart::from_storage(
            self.id,
            self.user_id,
            self.currency,
            items,
            self.created_at,
            self.updated_at,
        ))
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CartRow::into_cart).transpose()
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        let items = serde_json::to_value(cart.items())?;
        sqlx::query(
            "INSERT INTO carts (id, user_id, currency, items, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id) DO UPDATE SET items = $4, updated_at = $6",
        )
        .bind(cart.id())
        .bind(cart.user_id())
        .bind(cart.currency())
        .bind(items)
        .bind(cart.created_at())
        .bind(cart.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Order store
// =============================================================================

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    items: serde_json::Value,
    shipping_address: serde_json::Value,
    payment_method: String,
    payment_status: String,
    order_status: String,
    notes: Option<String>,
    subtotal: Decimal,
    tax: Decimal,
    shipping_cost: Decimal,
    total: Decimal,
    currency: String,
    idempotency_key: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order> {
        let items: Vec<OrderLine> = serde_json::from_value(self.items).map_err(corrupt)?;
        let shipping_address: Address =
            serde_json::from_value(self.shipping_address).map_err(corrupt)?;
        Ok(Order::from_storage(
            self.id,
            self.user_id,
            items,
            shipping_address,
            PaymentMethod::parse(&self.payment_method).map_err(corrupt)?,
            PaymentStatus::parse(&self.payment_status).map_err(corrupt)?,
            OrderStatus::parse(&self.order_status).map_err(corrupt)?,
            self.notes,
            Money::new(self.subtotal, &self.currency),
            Money::new(self.tax, &self.currency),
            Money::new(self.shipping_cost, &self.currency),
            Money::new(self.total, &self.currency),
            self.idempotency_key,
            self.created_at,
            self.updated_at,
        ))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let items = serde_json::to_value(order.items())?;
        let address = serde_json::to_value(order.shipping_address())?;
        let result = sqlx::query(
            "INSERT INTO orders (id, user_id, items, shipping_address, payment_method, \
             payment_status, order_status, notes, subtotal, tax, shipping_cost, total, \
             currency, idempotency_key, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(order.id())
        .bind(order.user_id())
        .bind(items)
        .bind(address)
        .bind(order.payment_method().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.order_status().as_str())
        .bind(order.notes())
        .bind(order.subtotal().amount())
        .bind(order.tax().amount())
        .bind(order.shipping_cost().amount())
        .bind(order.total().amount())
        .bind(order.total().currency())
        .bind(order.idempotency_key())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(AppError::Conflict(
                "An order for this cart already exists.".into(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn find_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn find_by_checkout_key(&self, key: &str) -> Result<Option<Order>> {
        let row =
            sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE idempotency_key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "UPDATE orders SET order_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(order_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn count(&self) -> Result<u64> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.0 as u64)
    }

    async fn revenue_total(&self) -> Result<Decimal> {
        let total: (Decimal,) = sqlx::query_as(
            "SELECT COALESCE(SUM(total), 0) FROM orders WHERE order_status <> 'cancelled'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(total.0)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn sales_by_day(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailySales>> {
        let rows: Vec<(NaiveDate, Decimal)> = sqlx::query_as(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, SUM(total) AS total \
             FROM orders \
             WHERE created_at >= $1 AND created_at <= $2 AND order_status <> 'cancelled' \
             GROUP BY day ORDER BY day",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(day, total)| DailySales { day, total })
            .collect())
    }

    async fn revenue_by_payment_method(&self) -> Result<Vec<MethodRevenue>> {
        let rows: Vec<(String, Decimal)> = sqlx::query_as(
            "SELECT payment_method, COALESCE(SUM(total), 0) \
             FROM orders WHERE order_status <> 'cancelled' \
             GROUP BY payment_method ORDER BY payment_method",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(method, total)| {
                Ok(MethodRevenue {
                    method: PaymentMethod::parse(&method).map_err(corrupt)?,
                    total,
                })
            })
            .collect()
    }
}
