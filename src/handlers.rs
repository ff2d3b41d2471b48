//! Business logic behind each catalogue command.
//!
//! Handlers only see payloads that already passed the gate's origin and
//! rate-limit checks, and requests that deserialized into their schema.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::clipboard::ClipboardPayload;
use crate::commands::COMMANDS;
use crate::config::Config;
use crate::document::{Document, DocumentLoader};
use crate::gate::{Command, CommandGate, CommandHandler, CommandRequest, CommandRouter};
use crate::security::{GuardError, HtmlSanitizer, SanitizationPolicy, UrlGuard, UrlValidation};

/// Longest path string accepted in a request.
const MAX_PATH_CHARS: usize = 4096;

/// The guards shared by every handler.
#[derive(Debug, Clone, Default)]
pub struct Guards {
    pub loader: DocumentLoader,
    pub urls: UrlGuard,
    pub sanitizer: HtmlSanitizer,
}

impl Guards {
    pub fn from_config(config: &Config) -> Self {
        Self {
            loader: DocumentLoader::from_config(config),
            urls: UrlGuard::from_config(&config.urls),
            sanitizer: HtmlSanitizer::new(SanitizationPolicy::from_config(&config.sanitizer)),
        }
    }
}

/// Hands a validated URL to whatever opens links on this system.
#[async_trait]
pub trait LinkOpener: Send + Sync {
    async fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Opens links with the platform's default handler.
pub struct SystemOpener;

#[async_trait]
impl LinkOpener for SystemOpener {
    async fn open(&self, url: &str) -> anyhow::Result<()> {
        let (program, args) = opener_command();
        let status = tokio::process::Command::new(program)
            .args(args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to launch {}", program))?;
        if !status.success() {
            anyhow::bail!("{} exited with {}", program, status);
        }
        Ok(())
    }
}

fn opener_command() -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "macos") {
        ("open", &[])
    } else if cfg!(windows) {
        ("rundll32", &["url.dll,FileProtocolHandler"])
    } else {
        ("xdg-open", &[])
    }
}

/// Register a handler for every catalogue command.
pub fn build_router(
    gate: &CommandGate,
    guards: Arc<Guards>,
    opener: Arc<dyn LinkOpener>,
) -> Result<CommandRouter, GuardError> {
    let mut router = gate.router();
    for def in COMMANDS {
        let handler: Arc<dyn CommandHandler> = match def.name {
            "ping" => Arc::new(Ping::new()),
            "open_file" => Arc::new(OpenFile(guards.clone())),
            "resolve_resource" => Arc::new(ResolveResource(guards.clone())),
            "open_external" => Arc::new(OpenExternal {
                guards: guards.clone(),
                opener: opener.clone(),
            }),
            "validate_url" => Arc::new(ValidateUrl(guards.clone())),
            "copy_rich_text" => Arc::new(CopyRichText(guards.clone())),
            other => return Err(GuardError::UnknownCommand(other.to_string())),
        };
        router.register(gate.wrap(def.name, handler, def.options))?;
    }
    Ok(router)
}

// ── ping ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PingRequest {}

impl CommandRequest for PingRequest {}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_ms: u64,
}

struct Ping {
    started: Instant,
}

impl Ping {
    fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl Command for Ping {
    type Request = PingRequest;
    type Response = PingResponse;

    async fn run(&self, _request: PingRequest) -> anyhow::Result<PingResponse> {
        Ok(PingResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            uptime_ms: self.started.elapsed().as_millis() as u64,
        })
    }
}

// ── open_file ───────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenFileRequest {
    pub path: String,
}

impl CommandRequest for OpenFileRequest {
    fn validate(&self) -> Result<(), String> {
        check_path_field("path", &self.path)
    }
}

struct OpenFile(Arc<Guards>);

#[async_trait]
impl Command for OpenFile {
    type Request = OpenFileRequest;
    type Response = Document;

    async fn run(&self, request: OpenFileRequest) -> anyhow::Result<Document> {
        Ok(self.0.loader.load(&request.path).await?)
    }
}

// ── resolve_resource ────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveResourceRequest {
    pub document: String,
    pub resource: String,
}

impl CommandRequest for ResolveResourceRequest {
    fn validate(&self) -> Result<(), String> {
        check_path_field("document", &self.document)?;
        check_path_field("resource", &self.resource)
    }
}

#[derive(Debug, Serialize)]
pub struct ResolvedResource {
    pub path: std::path::PathBuf,
    pub exists: bool,
}

struct ResolveResource(Arc<Guards>);

#[async_trait]
impl Command for ResolveResource {
    type Request = ResolveResourceRequest;
    type Response = ResolvedResource;

    async fn run(&self, request: ResolveResourceRequest) -> anyhow::Result<ResolvedResource> {
        let path = self
            .0
            .loader
            .resolve_resource(&request.document, &request.resource)?;
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        Ok(ResolvedResource { path, exists })
    }
}

// ── open_external / validate_url ────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UrlRequest {
    pub url: String,
}

impl CommandRequest for UrlRequest {}

#[derive(Debug, Serialize)]
pub struct OpenedUrl {
    pub url: String,
}

struct OpenExternal {
    guards: Arc<Guards>,
    opener: Arc<dyn LinkOpener>,
}

#[async_trait]
impl Command for OpenExternal {
    type Request = UrlRequest;
    type Response = OpenedUrl;

    async fn run(&self, request: UrlRequest) -> anyhow::Result<OpenedUrl> {
        let url = self.guards.urls.validate(&request.url)?;
        self.opener.open(&url).await?;
        info!("Opened external link");
        Ok(OpenedUrl { url })
    }
}

struct ValidateUrl(Arc<Guards>);

#[async_trait]
impl Command for ValidateUrl {
    type Request = UrlRequest;
    type Response = UrlValidation;

    async fn run(&self, request: UrlRequest) -> anyhow::Result<UrlValidation> {
        Ok(self.0.urls.report(&request.url))
    }
}

// ── copy_rich_text ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyRichTextRequest {
    pub html: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl CommandRequest for CopyRichTextRequest {}

struct CopyRichText(Arc<Guards>);

#[async_trait]
impl Command for CopyRichText {
    type Request = CopyRichTextRequest;
    type Response = ClipboardPayload;

    async fn run(&self, request: CopyRichTextRequest) -> anyhow::Result<ClipboardPayload> {
        Ok(ClipboardPayload::build(
            &self.0.sanitizer,
            &request.html,
            request.text.as_deref(),
        ))
    }
}

fn check_path_field(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    if value.chars().count() > MAX_PATH_CHARS {
        return Err(format!("{} is longer than {} characters", field, MAX_PATH_CHARS));
    }
    Ok(())
}
