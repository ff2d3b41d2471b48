//! Command gate: the single entry point for cross-process calls.
//!
//! ```text
//!   bridge ──► CommandRouter ──► GatedCommand::invoke
//!                 │                  │
//!                 │ unknown name     ├─ origin check     (ContextTracker)
//!                 ▼                  ├─ rate limit       (RateLimiter)
//!             failure envelope       ├─ schema + validate (CommandRequest)
//!                                    └─ handler, panics caught
//!                                          │
//!                                          ▼
//!                                   CommandEnvelope
//! ```

mod command_gate;
mod envelope;
mod handler;
mod origin;
mod rate_limit;
mod router;

pub use command_gate::{CommandGate, GateOptions, GatedCommand, render_error};
pub use envelope::CommandEnvelope;
pub use handler::{Command, CommandHandler, CommandRequest, into_guard_error};
pub use origin::{CommandContext, ContextRegistry, ContextTracker, SenderId};
pub use rate_limit::{RateLimiter, spawn_sweeper};
pub use router::CommandRouter;
