use anyhow::Result;
use async_trait::async_trait;
use shared::broker::{self, BrokerArgs};
use shared::BroadcastMessage;

#[async_trait]
pub trait OrderPublisher: Send + Sync {
    async fn publish(&self, message: &BroadcastMessage) -> Result<()>;
}

/// Publishes over a connection opened for the request and closed right after.
pub struct AmqpOrderPublisher {
    amqp_url: String,
    exchange: String,
}

impl AmqpOrderPublisher {
    pub fn new(args: &BrokerArgs) -> Self {
        Self {
            amqp_url: args.amqp_url.clone(),
            exchange: args.exchange.clone(),
        }
    }
}

#[async_trait]
impl OrderPublisher for AmqpOrderPublisher {
    async fn publish(&self, message: &BroadcastMessage) -> Result<()> {
        broker::publish(&self.amqp_url, &self.exchange, message).await
    }
}
