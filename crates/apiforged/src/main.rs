//! apiforged - HTTP front end for analysis, documentation and project storage.

mod error;
mod routes;
mod state;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use apiforge_core::ForgeConfig;
use clap::Parser;
use tracing::{info, Level};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "apiforged")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "apiforge HTTP daemon", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "APIFORGED_ADDR", default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    apiforge_core::init_tracing(args.json, level);

    let config = ForgeConfig::from_env().context("loading configuration")?;
    let state = AppState::from_config(&config).context("initializing services")?;
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("binding {}", args.addr))?;
    info!(addr = %args.addr, region = %config.region, "apiforged listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
