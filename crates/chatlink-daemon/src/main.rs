//! chatlink daemon.
//!
//! Spawns the bridge, links the session and serves the HTTP API until
//! interrupted.
//!
//! Usage:
//!   chatlink --bridge node --bridge-arg bridge.js [--port 3000] [--log-dir DIR]

mod cli;
mod presenter;

use std::process::ExitCode;
use std::sync::Arc;

use chatlink_core::{BridgeClient, EventBus, SessionClient, SessionController};
use chatlink_http::AppState;
use clap::Parser;

use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let client = Arc::new(BridgeClient::new(args.bridge_config()));
    let event_bus = Arc::new(EventBus::new());
    let presenter = presenter::spawn(&event_bus);

    let (session, _events) = SessionController::start(client.clone(), Arc::clone(&event_bus));
    let state = AppState::new(Arc::clone(&session), client.clone());

    let mut server = chatlink_http::start(state, &args.host, args.port).await?;

    if let Err(e) = session.initialize().await {
        server.stop().await;
        shutdown_bridge(&client).await;
        return Err(e.into());
    }

    tokio::signal::ctrl_c().await?;
    log::info!("Interrupted; shutting down");

    server.stop().await;
    shutdown_bridge(&client).await;
    presenter.abort();
    Ok(())
}

async fn shutdown_bridge(client: &BridgeClient) {
    if let Err(e) = client.destroy().await {
        log::warn!("Bridge teardown failed: {}", e);
    }
}
