pub mod broker;
pub mod consumer;
mod error;
pub mod readiness;
pub mod retry;
pub mod telemetry;

pub use error::Error;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fanout exchange every service declares and binds to.
pub const DEFAULT_EXCHANGE: &str = "order_exchange";

/// AMQP delivery mode asking the broker to persist the message.
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub product_id: String,
    pub quantity: i32,
}

impl Order {
    pub fn new(product_id: impl Into<String>, quantity: i32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }

    /// The order placed on every `create_order` request. Request bodies are not read.
    pub fn sample() -> Self {
        Self::new("123", 1)
    }
}

/// What travels over the fanout exchange.
///
/// The body on the wire is the bare UTF-8 product identifier. The optional
/// `message_id` rides in the AMQP `message_id` property and lets consumers
/// recognise a redelivery of something they already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    pub product_id: String,
    pub message_id: Option<String>,
}

impl BroadcastMessage {
    pub fn for_order(order: &Order) -> Self {
        Self {
            product_id: order.product_id.clone(),
            message_id: Some(Uuid::new_v4().to_string()),
        }
    }

    pub fn decode(body: &[u8], message_id: Option<&str>) -> Result<Self, Error> {
        let product_id = std::str::from_utf8(body)?.trim();
        if product_id.is_empty() {
            return Err(Error::EmptyProductId);
        }

        Ok(Self {
            product_id: product_id.to_string(),
            message_id: message_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        })
    }

    pub fn payload(&self) -> &[u8] {
        self.product_id.as_bytes()
    }
}
