use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::consumer::MessageHandler;
use shared::BroadcastMessage;
use tracing::{info, warn};

use crate::models::DecrementOutcome;
use crate::repository::ProductRepository;

/// Takes one unit of stock per broadcast order.
///
/// A store failure is returned rather than swallowed, so the delivery is
/// requeued instead of acknowledged and the decrement is tried again.
pub struct StockHandler {
    repository: Arc<dyn ProductRepository>,
}

impl StockHandler {
    pub fn new(repository: Arc<dyn ProductRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl MessageHandler for StockHandler {
    async fn handle(&self, message: &BroadcastMessage) -> Result<()> {
        let product_id = message.product_id.as_str();
        info!(product_id, "PRODUCT: Received order for product");

        let outcome = self
            .repository
            .decrement_stock(product_id, message.message_id.as_deref())
            .await
            .with_context(|| format!("failed to update stock for product {product_id}"))?;

        match outcome {
            DecrementOutcome::Decremented { new_stock } => {
                info!(product_id, new_stock, "Stock reduced");
            }
            DecrementOutcome::OutOfStock => {
                warn!(product_id, "Product out of stock, nothing to reduce");
            }
            DecrementOutcome::NotFound => {
                warn!(product_id, "Product not found, nothing to reduce");
            }
            DecrementOutcome::AlreadyProcessed => {
                info!(
                    product_id,
                    message_id = message.message_id.as_deref().unwrap_or("-"),
                    "Message already applied, skipping"
                );
            }
        }

        Ok(())
    }
}
