//! Order Aggregate
//!
//! The immutable record produced by checkout. Line items, address and the
//! financial fields are fixed at creation and never resynchronized with the
//! catalog; only the two status fields move afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::cart::{Cart, CartTotals};
use crate::domain::value_objects::{Address, Money, OrderStatus, PaymentMethod, PaymentStatus};
use crate::AppError;

#[derive(Clone, Debug)]
pub struct Order {
    id: Uuid,
    user_id: Uuid,
    items: Vec<OrderLine>,
    shipping_address: Address,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
    notes: Option<String>,
    subtotal: Money,
    tax: Money,
    shipping_cost: Money,
    total: Money,
    idempotency_key: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// One purchased line. Price and name are copies taken at order creation, so
/// the order keeps showing what the customer was charged even after the
/// product is repriced, renamed or deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub price_at_purchase: Money,
    pub name_at_purchase: String,
}

impl Order {
    /// Materializes an order from a cart snapshot. `items` must carry one line
    /// per cart line with the cart's snapshot prices; `totals` must come from
    /// the same snapshot. An empty line set is rejected.
    pub fn from_cart(
        cart: &Cart,
        items: Vec<OrderLine>,
        totals: CartTotals,
        shipping_address: Address,
        payment_method: PaymentMethod,
        notes: Option<String>,
    ) -> Result<Self, AppError> {
        if items.is_empty() {
            return Err(AppError::EmptyCart);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            user_id: cart.user_id(),
            items,
            shipping_address,
            payment_method,
            payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Processing,
            notes,
            subtotal: totals.subtotal,
            tax: totals.tax,
            shipping_cost: totals.shipping,
            total: totals.total,
            idempotency_key: checkout_key(cart.user_id(), &cart.fingerprint()),
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild from a persisted record. Only the storage layer calls this.
    #[allow(clippy::too_many_arguments)]
    pub fn from_storage(
        id: Uuid, user_id: Uuid, items: Vec<OrderLine>, shipping_address: Address,
        payment_method: PaymentMethod, payment_status: PaymentStatus, order_status: OrderStatus,
        notes: Option<String>, subtotal: Money, tax: Money, shipping_cost: Money, total: Money,
        idempotency_key: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, user_id, items, shipping_address, payment_method, payment_status,
            order_status, notes, subtotal, tax, shipping_cost, total, idempotency_key,
            created_at, updated_at,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn items(&self) -> &[OrderLine] { &self.items }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn order_status(&self) -> OrderStatus { self.order_status }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn tax(&self) -> &Money { &self.tax }
    pub fn shipping_cost(&self) -> &Money { &self.shipping_cost }
    pub fn total(&self) -> &Money { &self.total }
    pub fn idempotency_key(&self) -> &str { &self.idempotency_key }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Admin transition. Any member of the status set is accepted; the
    /// transition graph is deliberately left open.
    pub fn set_order_status(&mut self, status: OrderStatus) {
        self.order_status = status;
        self.touch();
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus) {
        self.payment_status = status;
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Idempotency key guarding against duplicate submission of the same cart.
pub fn checkout_key(user_id: Uuid, cart_fingerprint: &str) -> String {
    format!("{}:{}", user_id.simple(), cart_fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::StandardPricing;
    use rust_decimal::Decimal;

    fn address() -> Address {
        Address {
            street: "12 Ridge Rd".into(), town: "Accra".into(), region: "Greater Accra".into(),
            digital_address: "GA-183-8164".into(), phone: "+233201234567".into(), country: "Ghana".into(),
        }
    }

    #[test]
    fn test_rejects_empty_cart() {
        let cart = Cart::for_user(Uuid::new_v4(), "GHS");
        let totals = cart.totals(&StandardPricing);
        let err = Order::from_cart(&cart, vec![], totals, address(), PaymentMethod::MobileMoney, None)
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyCart));
    }

    #[test]
    fn test_copies_totals_and_defaults() {
        let mut cart = Cart::for_user(Uuid::new_v4(), "GHS");
        let product = Uuid::new_v4();
        cart.add_line(product, 2, Money::new(Decimal::new(1000, 2), "GHS"));
        let totals = cart.totals(&StandardPricing);
        let items = vec![OrderLine {
            product_id: product, quantity: 2,
            price_at_purchase: Money::new(Decimal::new(1000, 2), "GHS"),
            name_at_purchase: "Tray of eggs".into(),
        }];
        let order = Order::from_cart(&cart, items, totals, address(), PaymentMethod::CashOnDelivery, None)
            .unwrap();
        assert_eq!(order.order_status(), OrderStatus::Processing);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.subtotal().amount(), Decimal::new(2000, 2));
        assert_eq!(order.total().amount(), Decimal::new(2599, 2));
        assert_eq!(order.user_id(), cart.user_id());
    }

    #[test]
    fn test_status_moves_freely_within_set() {
        let mut cart = Cart::for_user(Uuid::new_v4(), "GHS");
        let product = Uuid::new_v4();
        cart.add_line(product, 1, Money::new(Decimal::new(500, 2), "GHS"));
        let totals = cart.totals(&StandardPricing);
        let items = vec![OrderLine {
            product_id: product, quantity: 1,
            price_at_purchase: Money::new(Decimal::new(500, 2), "GHS"),
            name_at_purchase: "Feed".into(),
        }];
        let mut order =
            Order::from_cart(&cart, items, totals, address(), PaymentMethod::BankTransfer, None).unwrap();
        order.set_order_status(OrderStatus::Delivered);
        order.set_order_status(OrderStatus::Processing);
        assert_eq!(order.order_status(), OrderStatus::Processing);
    }
}
