//! Chopper demo server
//!
//! Serves `/register`, `/login` and `/me` behind the request gateway.
//!
//! ```text
//! CHOPPER_TOKEN__SECRET=... CHOPPER_TOKEN__ISSUER=chopper \
//! CHOPPER_TOKEN__AUDIENCE=chopper-web chopper-demo --bind 127.0.0.1:8080
//! ```

mod logging;
mod routes;
mod users;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chopper_gateway::{
    BcryptHasher, Gateway, GatewayConfig, UuidGenerator, init_gateway_metrics,
};
use clap::Parser;
use tracing::info;

use crate::routes::AppState;
use crate::users::UserStore;

#[derive(Parser, Debug)]
#[command(name = "chopper-demo", version, about = "Demo server for the chopper request gateway")]
struct Args {
    /// Configuration file (.toml, .yaml, .yml or .json); CHOPPER_* variables override it
    #[arg(short, long, env = "CHOPPER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// bcrypt work factor for new passwords
    #[arg(long, default_value_t = 10)]
    bcrypt_cost: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.json_logs).context("failed to initialize logging")?;
    init_gateway_metrics();

    let config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => GatewayConfig::from_env()
            .context("failed to load configuration from environment")?,
    };

    let gateway = Gateway::from_config(&config).context("invalid gateway configuration")?;
    let eviction = gateway
        .admission()
        .spawn_eviction_task(config.admission.sweep_interval);

    let state = AppState {
        gateway,
        users: Arc::new(UserStore::new(
            Arc::new(BcryptHasher::new(args.bcrypt_cost)),
            Arc::new(UuidGenerator),
        )),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(
        address = %args.bind,
        issuer = %config.token.issuer,
        burst = config.admission.burst,
        refill_interval_ms = config.admission.refill_interval.as_millis() as u64,
        "Chopper demo listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    eviction.abort();
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
