mod api;
mod publisher;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use shared::broker::BrokerArgs;
use tracing::info;

use crate::publisher::AmqpOrderPublisher;

#[derive(Parser)]
#[command(name = "order-service")]
struct Args {
    #[command(flatten)]
    broker: BrokerArgs,

    #[arg(long, env = "PORT", default_value = "5002")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    shared::telemetry::init("info");
    let args = Args::parse();

    let app_state = api::AppState {
        publisher: Arc::new(AmqpOrderPublisher::new(&args.broker)),
    };
    let app = api::create_router(app_state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;

    info!("Order service web server started on port {}", args.port);
    info!(
        "Order service ready to accept HTTP requests at http://0.0.0.0:{}/create_order",
        args.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shared::telemetry::shutdown_signal())
        .await?;

    info!("Order service stopped");
    Ok(())
}
