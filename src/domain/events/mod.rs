//! Domain events published to the notification sink

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::order::Order;
use crate::domain::value_objects::OrderStatus;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created {
        order_id: Uuid,
        user_id: Uuid,
        total: Decimal,
        currency: String,
        item_count: usize,
        created_at: DateTime<Utc>,
    },
    StatusChanged {
        order_id: Uuid,
        status: OrderStatus,
    },
}

impl OrderEvent {
    /// Read-only projection of a completed order; no address or payment
    /// details leave the service.
    pub fn created(order: &Order) -> Self {
        Self::Created {
            order_id: order.id(),
            user_id: order.user_id(),
            total: order.total().amount(),
            currency: order.total().currency().to_string(),
            item_count: order.items().len(),
            created_at: order.created_at(),
        }
    }

    pub fn status_changed(order_id: Uuid, status: OrderStatus) -> Self {
        Self::StatusChanged { order_id, status }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "orders.created",
            Self::StatusChanged { .. } => "orders.status_changed",
        }
    }
}
