//! Farmgate Commerce
//!
//! Backend for a farm-produce storefront: per-user shopping carts, checkout
//! and immutable order records, plus the admin reporting reads on top of them.
//!
//! ## Features
//! - Per-user cart with add-time price snapshots
//! - Pluggable tax/shipping pricing policy
//! - Atomic cart-to-order checkout with per-user serialization
//! - Order status administration and sales reporting
//! - Best-effort order event publishing over NATS

use thiserror::Error;

pub mod api;
pub mod carts;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod notify;
pub mod storage;

// =============================================================================
// Error Types
// =============================================================================

/// Failure classes for every operation in the service.
///
/// Business-rule failures (`InvalidInput`, `EmptyCart`, `DataIntegrity`, ...)
/// are detected before any write. `Dependency` covers outbound collaborators
/// whose failures are logged and swallowed, never surfaced to a client.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Forbidden")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Cart is empty or does not exist")]
    EmptyCart,

    #[error("{0}")]
    DataIntegrity(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record"),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
