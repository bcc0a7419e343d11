//! Aggregates module
pub mod cart;
pub mod order;

pub use cart::{Cart, CartLine, CartTotals};
pub use order::{checkout_key, Order, OrderLine};
