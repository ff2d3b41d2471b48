use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use super::command_gate::{GatedCommand, render_error};
use super::envelope::CommandEnvelope;
use super::origin::CommandContext;
use crate::commands::find_command;
use crate::security::GuardError;

/// Maps catalogue command names to gated commands.
pub struct CommandRouter {
    commands: HashMap<String, GatedCommand>,
    detailed_errors: bool,
}

impl CommandRouter {
    pub fn new(detailed_errors: bool) -> Self {
        Self {
            commands: HashMap::new(),
            detailed_errors,
        }
    }

    /// Register a gated command. Names outside the catalogue are refused.
    pub fn register(&mut self, command: GatedCommand) -> Result<(), GuardError> {
        if find_command(command.name()).is_none() {
            return Err(GuardError::UnknownCommand(command.name().to_string()));
        }
        self.commands.insert(command.name().to_string(), command);
        Ok(())
    }

    pub fn detailed_errors(&self) -> bool {
        self.detailed_errors
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn dispatch(
        &self,
        name: &str,
        ctx: &CommandContext,
        payload: Value,
    ) -> CommandEnvelope<Value> {
        match self.commands.get(name) {
            Some(command) => command.invoke(ctx, payload).await,
            None => {
                let err = GuardError::UnknownCommand(name.to_string());
                warn!(command = name, sender = %ctx.label(), "Unknown command");
                CommandEnvelope::Failure(render_error(&err, self.detailed_errors))
            }
        }
    }
}
