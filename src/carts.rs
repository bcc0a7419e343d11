//! Cart operations
//!
//! Orchestrates cart mutations against the catalog and cart store. Every
//! mutation runs under the owning user's advisory lock so it serializes with
//! a concurrent checkout, and every response carries totals computed fresh
//! from the line items.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::checkout::UserLocks;
use crate::domain::aggregates::cart::{Cart, CartLine, CartTotals};
use crate::domain::pricing::PricingPolicy;
use crate::storage::{CartStore, ProductCatalog};
use crate::{AppError, Result};

/// Cart as returned to clients: current lines plus derived totals.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub totals: CartTotals,
    pub updated_at: DateTime<Utc>,
}

pub struct CartService {
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn ProductCatalog>,
    pricing: Arc<dyn PricingPolicy>,
    locks: Arc<UserLocks>,
    currency: String,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn ProductCatalog>,
        pricing: Arc<dyn PricingPolicy>,
        locks: Arc<UserLocks>,
        currency: &str,
    ) -> Self {
        Self { carts, catalog, pricing, locks, currency: currency.to_string() }
    }

    /// Adds a product to the user's cart, creating the cart on first use. The
    /// current catalog price is captured as the line's snapshot; adding a
    /// product that is already in the cart only bumps its quantity.
    pub async fn add_item(&self, user_id: Uuid, product_id: Uuid, quantity: u32) -> Result<CartView> {
        if quantity < 1 {
            return Err(AppError::InvalidInput("Quantity must be at least 1.".into()));
        }
        let _guard = self.locks.acquire(user_id).await;
        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or(AppError::NotFound("Product"))?;
        let mut cart = match self.carts.find_by_user(user_id).await? {
            Some(cart) => cart,
            None => Cart::for_user(user_id, &self.currency),
        };
        cart.add_line(product.id, quantity, product.price);
        self.carts.save(&cart).await?;
        Ok(self.view_of(cart))
    }

    /// Sets the quantity on an existing line. The snapshot price stays as it
    /// was at add time.
    pub async fn update_quantity(&self, user_id: Uuid, line_id: Uuid, quantity: u32) -> Result<CartView> {
        if quantity < 1 {
            return Err(AppError::InvalidInput("Quantity must be at least 1.".into()));
        }
        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self
            .carts
            .find_by_user(user_id)
            .await?
            .ok_or(AppError::NotFound("Cart"))?;
        cart.update_quantity(line_id, quantity)?;
        self.carts.save(&cart).await?;
        Ok(self.view_of(cart))
    }

    /// Removes a line. A line id that matches nothing leaves the cart as it
    /// was; only a missing cart is an error.
    pub async fn remove_line(&self, user_id: Uuid, line_id: Uuid) -> Result<CartView> {
        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self
            .carts
            .find_by_user(user_id)
            .await?
            .ok_or(AppError::NotFound("Cart"))?;
        cart.remove_line(line_id);
        self.carts.save(&cart).await?;
        Ok(self.view_of(cart))
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<CartView> {
        let _guard = self.locks.acquire(user_id).await;
        let mut cart = self
            .carts
            .find_by_user(user_id)
            .await?
            .ok_or(AppError::NotFound("Cart"))?;
        cart.clear();
        self.carts.save(&cart).await?;
        Ok(self.view_of(cart))
    }

    pub async fn view(&self, user_id: Uuid) -> Result<CartView> {
        let cart = self
            .carts
            .find_by_user(user_id)
            .await?
            .ok_or(AppError::NotFound("Cart"))?;
        Ok(self.view_of(cart))
    }

    fn view_of(&self, cart: Cart) -> CartView {
        let totals = cart.totals(self.pricing.as_ref());
        CartView {
            id: cart.id(),
            user_id: cart.user_id(),
            items: cart.items().to_vec(),
            totals,
            updated_at: cart.updated_at(),
        }
    }
}
