//! Checkout engine
//!
//! The cart-to-order transition. A checkout validates its inputs, snapshots
//! the cart under the user's advisory lock, recomputes totals through the
//! pricing policy, materializes the immutable order and clears the cart.
//! Failures before the order write leave the cart untouched; once the order
//! write succeeds the checkout reports success no matter what the cart clear
//! or the notification sink do afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::order::{checkout_key, OrderLine};
use crate::domain::aggregates::{Cart, Order};
use crate::domain::events::OrderEvent;
use crate::domain::pricing::PricingPolicy;
use crate::domain::value_objects::{Address, Money, OrderStatus, PaymentMethod};
use crate::notify::NotificationSink;
use crate::storage::{CartStore, OrderStore, ProductCatalog};
use crate::{AppError, Result};

/// Advisory locks keyed by user id. Whoever holds a user's lock owns that
/// user's cart for the read-validate-write span; requests for other users are
/// untouched.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Typed checkout input, validated before the engine does any work.
#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate]
    pub shipping_address: AddressInput,
    #[validate(length(min = 1, message = "paymentMethod is required"))]
    pub payment_method: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1))]
    pub street: String,
    #[validate(length(min = 1))]
    pub town: String,
    #[validate(length(min = 1))]
    pub region: String,
    #[validate(length(min = 1))]
    pub digital_address: String,
    #[validate(length(min = 1))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub country: String,
}

impl AddressInput {
    fn into_address(self) -> Address {
        Address {
            street: self.street.trim().to_string(),
            town: self.town.trim().to_string(),
            region: self.region.trim().to_string(),
            digital_address: self.digital_address.trim().to_string(),
            phone: self.phone.trim().to_string(),
            country: self.country.trim().to_string(),
        }
    }
}

/// What a successful checkout returns. The shipping address and payment
/// method are write-only inputs and are not echoed back.
#[derive(Debug, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    pub total: Money,
    pub status: OrderStatus,
    pub items: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
}

impl CheckoutReceipt {
    fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id(),
            total: order.total().clone(),
            status: order.order_status(),
            items: order.items().to_vec(),
            created_at: order.created_at(),
        }
    }
}

pub struct CheckoutEngine {
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn ProductCatalog>,
    pricing: Arc<dyn PricingPolicy>,
    sink: Arc<dyn NotificationSink>,
    locks: Arc<UserLocks>,
}

impl CheckoutEngine {
    pub fn new(
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn ProductCatalog>,
        pricing: Arc<dyn PricingPolicy>,
        sink: Arc<dyn NotificationSink>,
        locks: Arc<UserLocks>,
    ) -> Self {
        Self { carts, orders, catalog, pricing, sink, locks }
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn checkout(&self, user_id: Uuid, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        request
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let payment_method = PaymentMethod::parse(&request.payment_method)?;
        let shipping_address = request.shipping_address.into_address();
        shipping_address.validate()?;
        let notes = request
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let _guard = self.locks.acquire(user_id).await;

        let cart = match self.carts.find_by_user(user_id).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(AppError::EmptyCart),
        };

        // Resolve a display name for every line. The order charges the cart's
        // snapshot price, not whatever the catalog says now.
        let mut items = Vec::with_capacity(cart.items().len());
        for line in cart.items() {
            let product = self
                .catalog
                .get_product(line.product_id)
                .await?
                .ok_or_else(|| {
                    AppError::DataIntegrity("A product in the cart no longer exists.".into())
                })?;
            items.push(OrderLine {
                product_id: line.product_id,
                quantity: line.quantity,
                price_at_purchase: line.unit_price.clone(),
                name_at_purchase: product.name,
            });
        }

        let totals = cart.totals(self.pricing.as_ref());

        // Resubmission of an unchanged cart returns the order it already
        // produced instead of charging twice.
        let key = checkout_key(user_id, &cart.fingerprint());
        if let Some(existing) = self.orders.find_by_checkout_key(&key).await? {
            self.clear_cart_best_effort(&cart, existing.id()).await;
            return Ok(CheckoutReceipt::for_order(&existing));
        }

        let order = Order::from_cart(&cart, items, totals, shipping_address, payment_method, notes)?;
        match self.orders.insert(&order).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                // Lost a cross-process race on the same cart; that order is
                // this submission's result.
                if let Some(existing) = self.orders.find_by_checkout_key(&key).await? {
                    self.clear_cart_best_effort(&cart, existing.id()).await;
                    return Ok(CheckoutReceipt::for_order(&existing));
                }
                return Err(AppError::Conflict("Checkout raced with another request.".into()));
            }
            Err(err) => return Err(err),
        }

        tracing::info!(order_id = %order.id(), total = %order.total(), "order created");

        // The order stands from here on. A failed clear is recoverable by
        // reconcile(); a failed publish is someone else's retry problem.
        self.clear_cart_best_effort(&cart, order.id()).await;
        if let Err(err) = self.sink.publish(&OrderEvent::created(&order)).await {
            tracing::warn!(order_id = %order.id(), error = %err, "order notification failed");
        }

        Ok(CheckoutReceipt::for_order(&order))
    }

    /// Recovery pass for carts whose clear failed after the order write. If
    /// the cart's current fingerprint already produced an order, the cart is
    /// cleared and no new order is created.
    pub async fn reconcile(&self, user_id: Uuid) -> Result<Option<Uuid>> {
        let _guard = self.locks.acquire(user_id).await;
        let Some(mut cart) = self.carts.find_by_user(user_id).await? else {
            return Ok(None);
        };
        if cart.is_empty() {
            return Ok(None);
        }
        let key = checkout_key(user_id, &cart.fingerprint());
        let Some(order) = self.orders.find_by_checkout_key(&key).await? else {
            return Ok(None);
        };
        cart.clear();
        self.carts.save(&cart).await?;
        Ok(Some(order.id()))
    }

    async fn clear_cart_best_effort(&self, cart: &Cart, order_id: Uuid) {
        let mut cleared = cart.clone();
        cleared.clear();
        if let Err(err) = self.carts.save(&cleared).await {
            tracing::warn!(
                order_id = %order_id,
                user_id = %cart.user_id(),
                error = %err,
                "cart clear failed after order creation; reconciliation will retry"
            );
        }
    }
}
