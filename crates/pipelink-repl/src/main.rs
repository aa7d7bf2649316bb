//! pipelink-repl: embedded-interpreter-side host process
//!
//! Starts the JSON-RPC pipe service when a channel name is configured
//! and keeps it running until the process is told to exit. Without a
//! channel name the process still runs; the bridge is an optional
//! feature of the host application.

use anyhow::Result;
use pipelink_core::LinkError;
use pipelink_repl::config::Config;
use pipelink_repl::host::HostProxy;
use pipelink_repl::{handlers, logging};
use pipelink_rpc::RpcService;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    logging::init(&config)?;

    info!("pipelink host starting, version {}", env!("CARGO_PKG_VERSION"));

    let table = handlers::dispatch_table();
    let service = match RpcService::from_config(config.pipe_name.as_deref(), table) {
        Ok(service) => {
            service.start()?;
            Some(service)
        }
        Err(LinkError::ConfigMissing(reason)) => {
            info!("{reason}");
            None
        }
        Err(e) => return Err(e.into()),
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    if let Some(service) = service {
        // Best-effort farewell; fails fast when no peer is attached
        let host = HostProxy::new(service.client());
        host.log_message("interpreter host shutting down").await;
        service.stop();
    }

    Ok(())
}
