//! Notification sink
//!
//! Completed orders are projected into events and handed to a sink. Delivery
//! is best-effort: callers log a failed publish and move on, it never rolls a
//! checkout back. The production sink is a NATS client connected once at
//! startup and shared for the life of the process.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::events::OrderEvent;
use crate::{AppError, Result};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &OrderEvent) -> Result<()>;
}

pub struct NatsSink {
    client: async_nats::Client,
}

impl NatsSink {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSink for NatsSink {
    async fn publish(&self, event: &OrderEvent) -> Result<()> {
        let payload =
            serde_json::to_vec(event).map_err(|e| AppError::Dependency(e.to_string()))?;
        self.client
            .publish(event.subject().to_string(), payload.into())
            .await
            .map_err(|e| AppError::Dependency(e.to_string()))?;
        Ok(())
    }
}

/// Fallback sink when no NATS server is configured: events go to the log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn publish(&self, event: &OrderEvent) -> Result<()> {
        tracing::info!(subject = event.subject(), "order event (no sink configured)");
        Ok(())
    }
}

/// Test sink that records every event and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<RwLock<Vec<OrderEvent>>>,
    fail: Arc<std::sync::atomic::AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<OrderEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, event: &OrderEvent) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::Dependency("sink unreachable".into()));
        }
        self.events.write().await.push(event.clone());
        Ok(())
    }
}
