use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::envelope::CommandEnvelope;
use super::handler::CommandHandler;
use super::origin::{CommandContext, ContextTracker};
use super::rate_limit::{RateLimiter, spawn_sweeper};
use super::router::CommandRouter;
use crate::config::CommandsConfig;
use crate::security::GuardError;

/// Per-command checks to skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateOptions {
    pub skip_origin_check: bool,
    pub skip_rate_limit: bool,
}

impl GateOptions {
    /// Every check enabled.
    pub const STRICT: GateOptions = GateOptions {
        skip_origin_check: false,
        skip_rate_limit: false,
    };
}

/// Owns the rate limiter and its sweep task, and wraps handlers into
/// [`GatedCommand`]s that share them.
pub struct CommandGate {
    limiter: Arc<RateLimiter>,
    origins: Arc<dyn ContextTracker>,
    detailed_errors: bool,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CommandGate {
    pub fn new(config: &CommandsConfig, origins: Arc<dyn ContextTracker>) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(
                config.max_calls,
                Duration::from_millis(config.window_ms),
            )),
            origins,
            detailed_errors: config.error_detail.is_detailed(),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            sweeper: Mutex::new(None),
        }
    }

    /// Start the background sweep. Must be called inside a tokio runtime.
    /// Calling it again while the sweep runs does nothing.
    pub fn start(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        *sweeper = Some(spawn_sweeper(&self.limiter, self.sweep_interval));
        info!(
            "Command gate started (sweep every {}s)",
            self.sweep_interval.as_secs()
        );
    }

    /// Stop the background sweep. Gated commands keep working.
    pub fn shutdown(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Command gate sweep stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn detailed_errors(&self) -> bool {
        self.detailed_errors
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn wrap(
        &self,
        name: &str,
        handler: Arc<dyn CommandHandler>,
        options: GateOptions,
    ) -> GatedCommand {
        GatedCommand {
            name: name.to_string(),
            handler,
            options,
            limiter: self.limiter.clone(),
            origins: self.origins.clone(),
            detailed_errors: self.detailed_errors,
        }
    }

    /// Empty router rendering errors the way this gate does.
    pub fn router(&self) -> CommandRouter {
        CommandRouter::new(self.detailed_errors)
    }
}

impl Drop for CommandGate {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A handler behind origin, rate-limit and schema checks.
pub struct GatedCommand {
    name: String,
    handler: Arc<dyn CommandHandler>,
    options: GateOptions,
    limiter: Arc<RateLimiter>,
    origins: Arc<dyn ContextTracker>,
    detailed_errors: bool,
}

impl GatedCommand {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> GateOptions {
        self.options
    }

    /// Run the command. Never fails: every error becomes a failure envelope.
    pub async fn invoke(&self, ctx: &CommandContext, payload: Value) -> CommandEnvelope<Value> {
        match self.run(ctx, payload).await {
            Ok(data) => CommandEnvelope::Success(data),
            Err(e) => {
                warn!(
                    command = %self.name,
                    sender = %ctx.label(),
                    kind = e.kind(),
                    error = %e,
                    "Command failed"
                );
                CommandEnvelope::Failure(render_error(&e, self.detailed_errors))
            }
        }
    }

    async fn run(&self, ctx: &CommandContext, payload: Value) -> Result<Value, GuardError> {
        if !self.options.skip_origin_check {
            let sender = ctx
                .sender
                .ok_or_else(|| GuardError::Origin("anonymous sender".into()))?;
            if !self.origins.is_tracked(&sender) {
                return Err(GuardError::Origin(format!("unknown sender {}", sender)));
            }
        }

        if !self.options.skip_rate_limit {
            self.limiter
                .check(&format!("{}:{}", ctx.label(), self.name))?;
        }

        match AssertUnwindSafe(self.handler.call(payload))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(GuardError::Handler(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

/// Envelope text for `err`: user message only, or with redacted detail.
pub fn render_error(err: &GuardError, detailed: bool) -> String {
    if detailed {
        err.detailed_message()
    } else {
        err.user_message().to_string()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorDetailMode;
    use crate::gate::handler::{Command, CommandRequest};
    use crate::gate::origin::{ContextRegistry, MockContextTracker, SenderId};
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize)]
    struct Req {
        #[serde(default)]
        action: String,
    }

    impl CommandRequest for Req {}

    #[derive(Default)]
    struct Probe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Command for Probe {
        type Request = Req;
        type Response = Value;

        async fn run(&self, req: Req) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match req.action.as_str() {
                "panic" => panic!("boom"),
                "fail" => anyhow::bail!("cannot read /home/alice/notes/secret.md"),
                _ => Ok(json!("ok")),
            }
        }
    }

    fn config(detail: ErrorDetailMode) -> CommandsConfig {
        CommandsConfig {
            max_calls: 3,
            window_ms: 1000,
            sweep_interval_secs: 1,
            error_detail: detail,
        }
    }

    fn gate_with_registry(detail: ErrorDetailMode) -> (CommandGate, Arc<ContextRegistry>) {
        let registry = Arc::new(ContextRegistry::new());
        (CommandGate::new(&config(detail), registry.clone()), registry)
    }

    #[tokio::test]
    async fn tracked_sender_succeeds() {
        let (gate, registry) = gate_with_registry(ErrorDetailMode::Generic);
        let probe = Arc::new(Probe::default());
        let cmd = gate.wrap("ping", probe.clone(), GateOptions::STRICT);

        let ctx = CommandContext::from_sender(registry.create());
        let env = cmd.invoke(&ctx, json!({})).await;
        assert_eq!(env, CommandEnvelope::Success(json!("ok")));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_and_anonymous_senders_never_reach_handler() {
        let (gate, registry) = gate_with_registry(ErrorDetailMode::Generic);
        let probe = Arc::new(Probe::default());
        let cmd = gate.wrap("ping", probe.clone(), GateOptions::STRICT);

        let released = registry.create();
        registry.release(&released);

        for ctx in [
            CommandContext::anonymous(),
            CommandContext::from_sender(SenderId::new()),
            CommandContext::from_sender(released),
        ] {
            let env = cmd.invoke(&ctx, json!({})).await;
            assert_eq!(env.error(), Some("Request came from an untrusted window"));
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn origin_check_uses_tracker() {
        let mut tracker = MockContextTracker::new();
        tracker.expect_is_tracked().times(1).return_const(false);
        let gate = CommandGate::new(&config(ErrorDetailMode::Generic), Arc::new(tracker));
        let cmd = gate.wrap("ping", Arc::new(Probe::default()), GateOptions::STRICT);

        let env = cmd
            .invoke(&CommandContext::from_sender(SenderId::new()), json!({}))
            .await;
        assert!(!env.is_success());
    }

    #[tokio::test]
    async fn skip_origin_check_allows_anonymous() {
        let mut tracker = MockContextTracker::new();
        tracker.expect_is_tracked().never();
        let gate = CommandGate::new(&config(ErrorDetailMode::Generic), Arc::new(tracker));
        let options = GateOptions {
            skip_origin_check: true,
            ..GateOptions::default()
        };
        let cmd = gate.wrap("ping", Arc::new(Probe::default()), options);

        let env = cmd.invoke(&CommandContext::anonymous(), json!({})).await;
        assert!(env.is_success());
    }

    #[tokio::test]
    async fn rate_limit_applies_per_sender_and_command() {
        let (gate, registry) = gate_with_registry(ErrorDetailMode::Generic);
        let probe = Arc::new(Probe::default());
        let open = gate.wrap("open_file", probe.clone(), GateOptions::STRICT);
        let other = gate.wrap("validate_url", probe.clone(), GateOptions::STRICT);

        let a = CommandContext::from_sender(registry.create());
        let b = CommandContext::from_sender(registry.create());

        for _ in 0..3 {
            assert!(open.invoke(&a, json!({})).await.is_success());
        }
        let env = open.invoke(&a, json!({})).await;
        assert_eq!(env.error(), Some("Too many requests, please slow down"));

        assert!(open.invoke(&b, json!({})).await.is_success());
        assert!(other.invoke(&a, json!({})).await.is_success());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn skip_rate_limit_is_unbounded() {
        let (gate, registry) = gate_with_registry(ErrorDetailMode::Generic);
        let options = GateOptions {
            skip_rate_limit: true,
            ..GateOptions::default()
        };
        let cmd = gate.wrap("ping", Arc::new(Probe::default()), options);
        let ctx = CommandContext::from_sender(registry.create());
        for _ in 0..10 {
            assert!(cmd.invoke(&ctx, json!({})).await.is_success());
        }
        assert_eq!(gate.limiter().tracked(), 0);
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let (gate, registry) = gate_with_registry(ErrorDetailMode::Detailed);
        let cmd = gate.wrap("ping", Arc::new(Probe::default()), GateOptions::STRICT);
        let ctx = CommandContext::from_sender(registry.create());

        let env = cmd.invoke(&ctx, json!({"action": "panic"})).await;
        let error = env.error().unwrap();
        assert!(error.starts_with("An internal error occurred"));
        assert!(error.contains("boom"));

        // Gate still works afterwards.
        assert!(cmd.invoke(&ctx, json!({})).await.is_success());
    }

    #[tokio::test]
    async fn generic_mode_hides_detail() {
        let (gate, registry) = gate_with_registry(ErrorDetailMode::Generic);
        let cmd = gate.wrap("ping", Arc::new(Probe::default()), GateOptions::STRICT);
        let ctx = CommandContext::from_sender(registry.create());

        let env = cmd.invoke(&ctx, json!({"action": "fail"})).await;
        assert_eq!(env.error(), Some("An internal error occurred"));
    }

    #[tokio::test]
    async fn detailed_mode_redacts_paths() {
        let (gate, registry) = gate_with_registry(ErrorDetailMode::Detailed);
        let cmd = gate.wrap("ping", Arc::new(Probe::default()), GateOptions::STRICT);
        let ctx = CommandContext::from_sender(registry.create());

        let env = cmd.invoke(&ctx, json!({"action": "fail"})).await;
        let error = env.error().unwrap();
        assert!(error.contains("secret.md"), "{error}");
        assert!(!error.contains("/home/alice"), "{error}");
    }

    #[tokio::test]
    async fn schema_failure_envelope() {
        let (gate, registry) = gate_with_registry(ErrorDetailMode::Generic);
        let cmd = gate.wrap("ping", Arc::new(Probe::default()), GateOptions::STRICT);
        let ctx = CommandContext::from_sender(registry.create());

        let env = cmd.invoke(&ctx, json!({"action": 7})).await;
        assert_eq!(env.error(), Some("Invalid request payload"));
    }

    #[tokio::test]
    async fn start_and_shutdown() {
        let (gate, _registry) = gate_with_registry(ErrorDetailMode::Generic);
        assert!(!gate.is_running());
        gate.start();
        gate.start();
        assert!(gate.is_running());
        gate.shutdown();
        assert!(!gate.is_running());
        gate.shutdown();
    }
}
