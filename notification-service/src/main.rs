mod handlers;

use anyhow::Result;
use clap::Parser;
use shared::broker::BrokerArgs;
use shared::consumer::{self, ConsumerConfig};
use shared::readiness::{health_router, Readiness};
use shared::retry::RetryArgs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::handlers::EmailNotifier;

#[derive(Parser)]
#[command(name = "notification-service")]
struct Args {
    #[command(flatten)]
    broker: BrokerArgs,

    #[command(flatten)]
    retry: RetryArgs,

    /// Port of the `/health` endpoint.
    #[arg(long, env = "PORT", default_value = "5003")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    shared::telemetry::init("info");
    let args = Args::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shared::telemetry::shutdown_signal().await;
        on_signal.cancel();
    });

    let consumer_ready = Readiness::new("consumer");
    let consumer = tokio::spawn(consumer::run(
        ConsumerConfig::new(&args.broker, &args.retry, "notification-service"),
        EmailNotifier,
        consumer_ready.clone(),
        cancel.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!("Notification service health endpoint on port {}", args.port);

    let shutdown = cancel.clone();
    let served = axum::serve(listener, health_router(vec![consumer_ready]))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    cancel.cancel();
    if let Err(e) = consumer.await {
        error!("Consumer task failed: {}", e);
    }
    info!("Notification service stopped");

    served?;
    Ok(())
}
