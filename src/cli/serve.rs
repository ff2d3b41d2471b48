//! CLI subcommand: `mdguard serve`
//!
//! Runs the command bridge in the foreground until Ctrl-C. A fresh sender id
//! is registered at startup and published, with the bound address, in the
//! bridge file for the renderer to pick up.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::gate::{CommandGate, ContextRegistry};
use crate::handlers::{Guards, SystemOpener, build_router};
use crate::paths::Paths;
use crate::server::{BridgeInfo, bind_addr, body_limit, serve};

#[derive(Args)]
pub struct ServeArgs {
    /// Override the configured port (0 picks a free one)
    #[arg(short, long)]
    pub port: Option<u16>,
}

pub async fn run(args: ServeArgs, paths: &Paths) -> Result<()> {
    let mut config = super::load_config(paths)?;
    if !config.server.enabled {
        anyhow::bail!("Command bridge is disabled (server.enabled = false)");
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let registry = Arc::new(ContextRegistry::new());
    let gate = CommandGate::new(&config.commands, registry.clone());
    gate.start();

    let guards = Arc::new(Guards::from_config(&config));
    let router = Arc::new(build_router(&gate, guards, Arc::new(SystemOpener))?);

    let listener = TcpListener::bind(bind_addr(&config.server)?).await?;
    let sender = registry.create();
    let info = BridgeInfo {
        address: listener.local_addr()?,
        sender,
        pid: std::process::id(),
    };
    let bridge_file = paths.bridge_file();
    info.write(&bridge_file)?;
    info!("Bridge details written to {}", bridge_file.display());

    let result = serve(listener, router, body_limit(&config.sanitizer), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutting down");
    })
    .await;

    if let Err(e) = std::fs::remove_file(&bridge_file) {
        warn!("Failed to remove {}: {}", bridge_file.display(), e);
    }
    registry.release(&sender);
    gate.shutdown();

    result
}
