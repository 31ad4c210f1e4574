use anyhow::Result;
use async_trait::async_trait;
use shared::consumer::MessageHandler;
use shared::BroadcastMessage;
use tracing::info;

/// Stands in for an email gateway: every purchase becomes a log line.
pub struct EmailNotifier;

#[async_trait]
impl MessageHandler for EmailNotifier {
    async fn handle(&self, message: &BroadcastMessage) -> Result<()> {
        info!(
            product_id = %message.product_id,
            message_id = message.message_id.as_deref().unwrap_or("-"),
            "NOTIFICATION: Sending email for purchased product"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_broadcast_is_acknowledged() {
        let notifier = EmailNotifier;

        for body in ["123", "456", "unknown-product"] {
            let message = BroadcastMessage::decode(body.as_bytes(), None).unwrap();
            assert!(notifier.handle(&message).await.is_ok());
        }
    }
}
