//! Localhost command bridge.
//!
//! Carries commands from a renderer process to the [`CommandRouter`]. The
//! sender id travels in the `x-mdguard-sender` header. Every command
//! response is `200 OK` with a [`CommandEnvelope`] body, whatever the
//! outcome.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State, rejection::BytesRejection},
    http::HeaderMap,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{SanitizerConfig, ServerConfig};
use crate::gate::{CommandContext, CommandEnvelope, CommandRouter, SenderId, render_error};
use crate::security::GuardError;

pub const SENDER_HEADER: &str = "x-mdguard-sender";

/// Room for the JSON around a payload's largest string field.
const JSON_OVERHEAD: usize = 64 * 1024;

/// What a renderer needs to reach a running bridge. Written to
/// `Paths::bridge_file()` by `mdguard serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub address: SocketAddr,
    pub sender: SenderId,
    pub pid: u32,
}

impl BridgeInfo {
    /// Write the handshake file. The sender id is a credential, so the file
    /// is owner-only from the moment it exists.
    pub fn write(&self, path: &std::path::Path) -> Result<()> {
        use std::io::Write;

        let json = serde_json::to_string_pretty(self)?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(path)
            .with_context(|| format!("Failed to write bridge file: {}", path.display()))?;

        // A file left by an earlier run keeps its old mode; tighten it first.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write bridge file: {}", path.display()))?;
        Ok(())
    }

    pub fn read(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bridge file: {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Parse the configured bind address. Non-loopback addresses are allowed
/// but logged.
pub fn bind_addr(config: &ServerConfig) -> Result<SocketAddr> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind, config.port))?;
    if !addr.ip().is_loopback() {
        warn!("Bridge bound to non-loopback address {}", addr);
    }
    Ok(addr)
}

/// Largest request body the bridge buffers: a `copy_rich_text` payload at
/// the sanitizer's input limit, with every byte JSON-escaped. `None` when
/// the sanitizer is unlimited.
pub fn body_limit(sanitizer: &SanitizerConfig) -> Option<usize> {
    match sanitizer.max_input_bytes {
        0 => None,
        n => Some(n.saturating_mul(2).saturating_add(JSON_OVERHEAD)),
    }
}

pub fn app(router: Arc<CommandRouter>, body_limit: Option<usize>) -> Router {
    let limit = match body_limit {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };
    Router::new()
        .route("/health", get(health_check))
        .route("/api/commands/{name}", post(dispatch_command))
        .layer(limit)
        .layer(TraceLayer::new_for_http())
        .with_state(router)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    router: Arc<CommandRouter>,
    body_limit: Option<usize>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("Command bridge listening on http://{}", addr);
    axum::serve(listener, app(router, body_limit))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Command bridge stopped");
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn dispatch_command(
    State(router): State<Arc<CommandRouter>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Json<CommandEnvelope<Value>> {
    let ctx = CommandContext::from_header(
        headers
            .get(SENDER_HEADER)
            .and_then(|value| value.to_str().ok()),
    );

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let err = GuardError::Schema(rejection.body_text());
            warn!(command = %name, sender = %ctx.label(), error = %err, "Unreadable request body");
            return Json(CommandEnvelope::Failure(render_error(
                &err,
                router.detailed_errors(),
            )));
        }
    };

    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                let err = GuardError::Schema(e.to_string());
                warn!(command = %name, sender = %ctx.label(), error = %err, "Malformed request body");
                return Json(CommandEnvelope::Failure(render_error(
                    &err,
                    router.detailed_errors(),
                )));
            }
        }
    };

    Json(router.dispatch(&name, &ctx, payload).await)
}
