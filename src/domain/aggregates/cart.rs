//! Cart Aggregate
//!
//! One mutable cart per user. Each line keeps the unit price captured when the
//! product was first added; later catalog repricing never touches lines that
//! are already in the cart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pricing::PricingPolicy;
use crate::domain::value_objects::Money;
use crate::AppError;

#[derive(Clone, Debug)]
pub struct Cart {
    id: Uuid,
    user_id: Uuid,
    currency: String,
    items: Vec<CartLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartLine {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

/// Totals derived from the current lines. Computed fresh on every read.
#[derive(Clone, Debug, Serialize)]
pub struct CartTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
}

impl Cart {
    pub fn for_user(user_id: Uuid, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(), user_id, currency: currency.to_string(),
            items: vec![], created_at: now, updated_at: now,
        }
    }

    /// Rebuild from a persisted record. Only the storage layer calls this.
    pub fn from_storage(
        id: Uuid, user_id: Uuid, currency: String, items: Vec<CartLine>,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, user_id, currency, items, created_at, updated_at }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn items(&self) -> &[CartLine] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Adds a product or bumps its quantity when a line already exists.
    /// The existing snapshot price wins on merge; units already in the cart
    /// are never silently repriced.
    pub fn add_line(&mut self, product_id: Uuid, quantity: u32, unit_price: Money) {
        if let Some(existing) = self.items.iter_mut().find(|l| l.product_id == product_id) {
            existing.quantity += quantity;
        } else {
            self.items.push(CartLine { id: Uuid::new_v4(), product_id, quantity, unit_price });
        }
        self.touch();
    }

    /// Sets the quantity on one line. The price snapshot is untouched.
    pub fn update_quantity(&mut self, line_id: Uuid, quantity: u32) -> Result<(), AppError> {
        let line = self
            .items
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or(AppError::NotFound("Cart item"))?;
        line.quantity = quantity;
        self.touch();
        Ok(())
    }

    /// Removes a line by id. A missing line leaves the cart unchanged; removal
    /// is idempotent in effect.
    pub fn remove_line(&mut self, line_id: Uuid) {
        self.items.retain(|l| l.id != line_id);
        self.touch();
    }

    /// Removes whatever line references the product, if any.
    pub fn remove_product(&mut self, product_id: Uuid) {
        self.items.retain(|l| l.product_id != product_id);
        self.touch();
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
    }

    /// Derives subtotal/tax/shipping/total from the current lines. Never
    /// served from a stored field.
    pub fn totals(&self, policy: &dyn PricingPolicy) -> CartTotals {
        let subtotal_amount: Decimal = self
            .items
            .iter()
            .map(|l| l.unit_price.amount() * Decimal::from(l.quantity))
            .sum();
        let subtotal = Money::new(subtotal_amount, &self.currency);
        let tax = policy.tax(&subtotal, &self.items);
        let shipping = policy.shipping(&subtotal, &self.items);
        let total = Money::new(
            subtotal.amount() + tax.amount() + shipping.amount(),
            &self.currency,
        );
        CartTotals { subtotal, tax, shipping, total }
    }

    /// Deterministic digest of the line set, independent of insertion order.
    /// Two carts with the same products, quantities and snapshot prices
    /// produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut parts: Vec<String> = self
            .items
            .iter()
            .map(|l| format!("{}:{}:{}", l.product_id.simple(), l.quantity, l.unit_price.amount().normalize()))
            .collect();
        parts.sort();
        parts.join(";")
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}
