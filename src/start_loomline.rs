//! Startup helpers for the loomline service.
//!
//! Brings up both frontends over one shared state: the HTTP frontend and
//! the binary RPC frontend, each with graceful shutdown on ctrl-c.

use std::net::SocketAddr;
use std::process::ExitCode;

use crate::core::config::Config;
use crate::core::errors::{ServiceError, ServiceResult};
use crate::server::{self, AppState};
use crate::store::Store;
use crate::rpc;

/// Run the service until interrupted (used by the `loomline-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting loomline v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    if let Err(err) = config.validate() {
        tracing::error!("Invalid configuration: {err}");
        return ExitCode::from(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!("Failed to create runtime: {err}");
            return ExitCode::from(1);
        }
    };

    if let Err(err) = rt.block_on(serve(config)) {
        tracing::error!("Server error: {err}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Open the store and run both frontends until ctrl-c.
///
/// # Errors
/// Returns an error if the store cannot be opened, an address is invalid,
/// or either frontend fails.
pub async fn serve(config: Config) -> ServiceResult<()> {
    let store = Store::open(&config.storage).await?;
    let http_addr = bind_addr(&config.http.host, config.http.port)?;
    let rpc_addr = bind_addr(&config.rpc.host, config.rpc.port)?;
    let state = AppState::new(config, store);

    let http = server::run_server_with_shutdown(state.clone(), http_addr, shutdown_signal());
    let rpc = rpc::run_rpc_server_with_shutdown(state, rpc_addr, shutdown_signal());
    tokio::try_join!(http, rpc)?;
    Ok(())
}

fn bind_addr(host: &str, port: u16) -> ServiceResult<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .map_err(|err| ServiceError::InvalidConfig(format!("invalid bind address: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {err}");
    }
}
