mod api;
mod bootstrap;
mod config;
mod handlers;
mod models;
mod repository;
mod schema;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use shared::broker::BrokerArgs;
use shared::consumer::{self, ConsumerConfig};
use shared::readiness::Readiness;
use shared::retry::RetryArgs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::StoreArgs;
use crate::handlers::StockHandler;
use crate::repository::{PgProductRepository, ProductRepository};

#[derive(Parser)]
#[command(name = "product-service")]
struct Args {
    #[command(flatten)]
    broker: BrokerArgs,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    retry: RetryArgs,

    #[arg(long, env = "PORT", default_value = "5001")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    shared::telemetry::init("info");
    let args = Args::parse();
    let backoff = args.retry.backoff();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shared::telemetry::shutdown_signal().await;
        on_signal.cancel();
    });

    let store_ready = Readiness::new("store");
    let consumer_ready = Readiness::new("consumer");

    // The store must be ready before anything is served or consumed.
    info!("Initializing database...");
    let Some(pool) = bootstrap::connect_store(&args.store.database_url(), &backoff, &cancel).await?
    else {
        info!("Shutdown requested before the database became available");
        return Ok(());
    };
    let repository: Arc<dyn ProductRepository> = Arc::new(PgProductRepository::new(pool));
    bootstrap::seed(repository.as_ref()).await?;
    store_ready.mark_ready();

    let consumer = tokio::spawn(consumer::run(
        ConsumerConfig::new(&args.broker, &args.retry, "product-service"),
        StockHandler::new(repository.clone()),
        consumer_ready.clone(),
        cancel.clone(),
    ));

    let app = api::create_router(
        api::AppState { repository },
        vec![store_ready, consumer_ready],
    );
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!("Product service web server started on port {}", args.port);

    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    cancel.cancel();
    if let Err(e) = consumer.await {
        error!("Consumer task failed: {}", e);
    }
    info!("Product service stopped");

    served?;
    Ok(())
}
