use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions,
};
use lapin::types::FieldTable;
use lapin::Connection;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::{self, BrokerArgs};
use crate::readiness::Readiness;
use crate::retry::{self, Backoff, RetryArgs};
use crate::{BroadcastMessage, Error};

/// Side effect a consumer applies to each broadcast.
///
/// Returning `Ok` acknowledges the delivery. Returning `Err` requeues it on
/// the same channel and it is handled again after a backoff delay.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &BroadcastMessage) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    DeclaringTopology,
    Consuming,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumerState::Disconnected => "disconnected",
            ConsumerState::Connecting => "connecting",
            ConsumerState::DeclaringTopology => "declaring-topology",
            ConsumerState::Consuming => "consuming",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub amqp_url: String,
    pub exchange: String,
    pub consumer_tag: String,
    pub backoff: Backoff,
}

impl ConsumerConfig {
    pub fn new(broker: &BrokerArgs, retry: &RetryArgs, consumer_tag: impl Into<String>) -> Self {
        Self {
            amqp_url: broker.amqp_url.clone(),
            exchange: broker.exchange.clone(),
            consumer_tag: consumer_tag.into(),
            backoff: retry.backoff(),
        }
    }
}

fn enter(tag: &str, state: ConsumerState) {
    debug!(consumer = tag, state = %state, "Consumer state changed");
}

/// Consumes broadcasts until `cancel` fires.
///
/// Connection, channel and stream failures end the current session and start
/// over from `Disconnected` after a backoff delay. Handler failures do not:
/// the delivery is requeued on the live channel, because closing the
/// connection would delete the exclusive queue together with the message.
/// The function itself never fails.
pub async fn run<H: MessageHandler>(
    config: ConsumerConfig,
    handler: H,
    readiness: Readiness,
    cancel: CancellationToken,
) {
    let tag = config.consumer_tag.as_str();
    let mut failures: u32 = 0;

    info!(consumer = tag, "Waiting for broker...");

    loop {
        enter(tag, ConsumerState::Disconnected);
        if cancel.is_cancelled() {
            break;
        }

        enter(tag, ConsumerState::Connecting);
        let connection = retry::retry(&config.backoff, &cancel, "Broker connection", || {
            broker::connect(&config.amqp_url)
        })
        .await;
        let Some(connection) = connection else {
            break;
        };

        let mut processed: u64 = 0;
        let outcome = consume(
            &config,
            &connection,
            &handler,
            &readiness,
            &cancel,
            &mut processed,
        )
        .await;
        readiness.mark_not_ready();
        broker::close(&connection).await;

        if processed > 0 {
            failures = 0;
        }

        match outcome {
            Ok(()) => break,
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = config.backoff.delay(failures);
                error!(
                    consumer = tag,
                    delay_ms = delay.as_millis() as u64,
                    "Consumer session failed: {:#}. Reconnecting",
                    e
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = time::sleep(delay) => {}
                }
            }
        }
    }

    readiness.mark_not_ready();
    info!(consumer = tag, "Consumer stopped");
}

/// One connected session. `Ok` only on cancellation.
async fn consume<H: MessageHandler>(
    config: &ConsumerConfig,
    connection: &Connection,
    handler: &H,
    readiness: &Readiness,
    cancel: &CancellationToken,
    processed: &mut u64,
) -> Result<()> {
    let tag = config.consumer_tag.as_str();
    enter(tag, ConsumerState::DeclaringTopology);

    let channel = connection
        .create_channel()
        .await
        .context("failed to open channel")?;
    // One unacknowledged delivery at a time.
    channel
        .basic_qos(1, BasicQosOptions::default())
        .await
        .context("failed to set prefetch")?;
    broker::declare_exchange(&channel, &config.exchange).await?;
    let queue = broker::declare_private_queue(&channel, &config.exchange).await?;

    let mut deliveries = channel
        .basic_consume(
            &queue,
            tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("failed to consume from {queue}"))?;

    enter(tag, ConsumerState::Consuming);
    readiness.mark_ready();
    info!(
        consumer = tag,
        exchange = %config.exchange,
        queue = %queue,
        "Bound to exchange. Waiting for messages"
    );

    let mut handler_failures: u32 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            next = deliveries.next() => next,
        };

        let delivery = match next {
            Some(delivery) => delivery.context("failed to receive delivery")?,
            None => return Err(Error::StreamClosed.into()),
        };

        let message_id = delivery.properties.message_id().as_ref().map(|id| id.as_str());
        let disposition = process(handler, &delivery.acker, &delivery.data, message_id).await?;

        match disposition {
            Disposition::Acked => {
                handler_failures = 0;
                *processed += 1;
            }
            Disposition::Rejected => {}
            Disposition::Requeued(e) => {
                handler_failures = handler_failures.saturating_add(1);
                let delay = config.backoff.delay(handler_failures);
                error!(
                    consumer = tag,
                    delivery_tag = delivery.delivery_tag,
                    delay_ms = delay.as_millis() as u64,
                    "{:#}. Message requeued",
                    e
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    _ = time::sleep(delay) => {}
                }
            }
        }
    }
}

/// How a delivery was settled with the broker.
#[derive(Debug)]
pub enum Disposition {
    /// Handled; acknowledged.
    Acked,
    /// Undecodable; dropped without requeue.
    Rejected,
    /// Handler failed; returned to the queue for another attempt.
    Requeued(anyhow::Error),
}

/// Broker-side settlement of a single delivery.
#[async_trait]
pub trait Settle: Send + Sync {
    async fn ack(&self) -> Result<()>;
    async fn reject(&self) -> Result<()>;
    async fn requeue(&self) -> Result<()>;
}

#[async_trait]
impl Settle for Acker {
    async fn ack(&self) -> Result<()> {
        Acker::ack(self, BasicAckOptions::default())
            .await
            .context("failed to acknowledge message")?;
        Ok(())
    }

    async fn reject(&self) -> Result<()> {
        Acker::reject(self, BasicRejectOptions { requeue: false })
            .await
            .context("failed to reject message")?;
        Ok(())
    }

    async fn requeue(&self) -> Result<()> {
        Acker::nack(
            self,
            BasicNackOptions {
                multiple: false,
                requeue: true,
            },
        )
        .await
        .context("failed to requeue message")?;
        Ok(())
    }
}

/// Decodes, handles and settles one delivery.
///
/// The ack is sent only after the handler succeeded. `Err` means settling
/// itself failed, which points at a broken channel.
pub async fn process<H, S>(
    handler: &H,
    settle: &S,
    body: &[u8],
    message_id: Option<&str>,
) -> Result<Disposition>
where
    H: MessageHandler + ?Sized,
    S: Settle + ?Sized,
{
    let message = match BroadcastMessage::decode(body, message_id) {
        Ok(message) => message,
        Err(e) => {
            // Redelivering a body that cannot be decoded would block the queue forever.
            warn!("Rejecting undecodable message: {}", e);
            settle.reject().await?;
            return Ok(Disposition::Rejected);
        }
    };

    if let Err(e) = handler.handle(&message).await {
        settle.requeue().await?;
        return Ok(Disposition::Requeued(e.context(format!(
            "handler failed for product {}",
            message.product_id
        ))));
    }

    settle.ack().await?;
    debug!(product_id = %message.product_id, "Acknowledged message");

    Ok(Disposition::Acked)
}
