//! Request/response contract for the inter-service message bus.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait ServiceBus: Send + Sync {
    /// Send `payload` on `topic` and wait for the handling service's reply.
    async fn request(&self, topic: &str, payload: Value) -> Result<Value>;
}
