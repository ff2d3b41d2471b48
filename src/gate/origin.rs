//! Sender identity for bridge calls.
//!
//! Every renderer context the host creates gets a random [`SenderId`]. A
//! command is only accepted from an id the registry still tracks; ids are
//! released when the context closes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(Uuid);

impl SenderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SenderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SenderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Answers whether a sender is a live context of this process.
#[cfg_attr(test, mockall::automock)]
pub trait ContextTracker: Send + Sync {
    fn is_tracked(&self, sender: &SenderId) -> bool;
}

/// The contexts this process has created and not yet released.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: RwLock<HashSet<SenderId>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and track a new context.
    pub fn create(&self) -> SenderId {
        let id = SenderId::new();
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        debug!(sender = %id, "Registered context");
        id
    }

    /// Stop tracking `id`. Returns false if it was not tracked.
    pub fn release(&self, id: &SenderId) -> bool {
        let removed = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed {
            debug!(sender = %id, "Released context");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContextTracker for ContextRegistry {
    fn is_tracked(&self, sender: &SenderId) -> bool {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(sender)
    }
}

/// Who is calling. `None` means the transport could not identify a sender.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandContext {
    pub sender: Option<SenderId>,
}

impl CommandContext {
    pub fn anonymous() -> Self {
        Self { sender: None }
    }

    pub fn from_sender(sender: SenderId) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Parse a transport header value. Malformed values are anonymous.
    pub fn from_header(value: Option<&str>) -> Self {
        Self {
            sender: value.and_then(|v| v.parse().ok()),
        }
    }

    /// Rate-limit key component.
    pub fn label(&self) -> String {
        match self.sender {
            Some(id) => id.to_string(),
            None => "anonymous".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_contexts_are_tracked_until_released() {
        let registry = ContextRegistry::new();
        let id = registry.create();
        assert!(registry.is_tracked(&id));
        assert_eq!(registry.len(), 1);

        assert!(registry.release(&id));
        assert!(!registry.is_tracked(&id));
        assert!(!registry.release(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn foreign_ids_are_not_tracked() {
        let registry = ContextRegistry::new();
        registry.create();
        assert!(!registry.is_tracked(&SenderId::new()));
    }

    #[test]
    fn header_parsing() {
        let id = SenderId::new();
        let ctx = CommandContext::from_header(Some(&format!(" {} ", id)));
        assert_eq!(ctx.sender, Some(id));
        assert_eq!(ctx.label(), id.to_string());

        assert!(CommandContext::from_header(Some("not-a-uuid")).sender.is_none());
        assert!(CommandContext::from_header(None).sender.is_none());
        assert_eq!(CommandContext::anonymous().label(), "anonymous");
    }

    #[test]
    fn sender_id_serializes_as_string() {
        let id = SenderId::new();
        assert_eq!(
            serde_json::to_value(id).unwrap(),
            serde_json::Value::String(id.to_string())
        );
    }
}
