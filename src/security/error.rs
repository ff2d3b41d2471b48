//! Error taxonomy shared by every guard.
//!
//! Each variant carries two renderings:
//!
//! - [`Display`](std::fmt::Display): the detailed form, for logs and
//!   development builds. May contain paths and parser output.
//! - [`GuardError::user_message`]: a short, actionable sentence that is
//!   always safe to show to the user.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    /// Bytes are not well-formed UTF-8.
    #[error("invalid UTF-8 at byte offset {offset}")]
    Encoding { offset: usize },

    /// Bytes decode, but look like a binary file.
    #[error("binary content: {reason}")]
    BinaryContent { reason: String },

    /// Input exceeds the configured byte limit.
    #[error("file is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    /// Path fails the extension allowlist or is otherwise unusable.
    #[error("unsafe path '{path}': {reason}")]
    UnsafePath { path: String, reason: String },

    /// A secondary resource resolves outside its base directory.
    #[error("'{candidate}' escapes base directory '{base}'")]
    PathEscape { base: String, candidate: String },

    /// URL is blocked, unknown, oversized, or malformed.
    #[error("unsafe URL: {reason}")]
    UnsafeUrl { reason: UrlRejection },

    /// Command sender is not a context this process created.
    #[error("untrusted sender: {0}")]
    Origin(String),

    /// Sliding-window limit reached for this sender and command.
    #[error("rate limit exceeded for '{key}' ({max_calls} calls per {window_ms} ms)")]
    RateLimited {
        key: String,
        max_calls: usize,
        window_ms: u64,
    },

    /// Command payload does not match the request schema.
    #[error("invalid payload: {0}")]
    Schema(String),

    /// Command name is not in the catalogue.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Sanitizer input could not be turned into a tree within limits.
    #[error("HTML parse failure: {0}")]
    Parse(String),

    /// Business-logic failure inside a command handler.
    #[error("handler failed: {0}")]
    Handler(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a URL was refused. Kept as data so callers can log the exact reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlRejection {
    #[error("URL length {length} exceeds maximum {max}")]
    TooLong { length: usize, max: usize },

    #[error("URL is empty")]
    Empty,

    #[error("URL could not be parsed: {0}")]
    Malformed(String),

    #[error("blocked protocol '{0}'")]
    BlockedProtocol(String),

    #[error("protocol '{0}' is not allowed")]
    UnlistedProtocol(String),
}

impl GuardError {
    /// Wrap a handler failure, keeping the full `anyhow` context chain.
    pub fn handler(err: anyhow::Error) -> Self {
        GuardError::Handler(format!("{:#}", err))
    }

    /// Short message safe for display in production builds.
    pub fn user_message(&self) -> &'static str {
        match self {
            GuardError::Encoding { .. } => "File contains invalid UTF-8 characters",
            GuardError::BinaryContent { .. } => "File appears to be binary, not text",
            GuardError::FileTooLarge { .. } => "File is too large to open",
            GuardError::UnsafePath { .. } => "Only Markdown files (.md, .markdown) can be opened",
            GuardError::PathEscape { .. } => "Resource is outside the document folder",
            GuardError::UnsafeUrl { reason } => match reason {
                UrlRejection::TooLong { .. } => "URL is too long",
                UrlRejection::Empty => "URL is empty",
                UrlRejection::Malformed(_) => "Invalid URL",
                UrlRejection::BlockedProtocol(_) | UrlRejection::UnlistedProtocol(_) => {
                    "Only HTTP and HTTPS URLs are allowed"
                }
            },
            GuardError::Origin(_) => "Request came from an untrusted window",
            GuardError::RateLimited { .. } => "Too many requests, please slow down",
            GuardError::Schema(_) => "Invalid request payload",
            GuardError::UnknownCommand(_) => "Unknown command",
            GuardError::Parse(_) => "Could not process HTML content",
            GuardError::Handler(_) | GuardError::Io(_) => "An internal error occurred",
        }
    }

    /// Stable identifier for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GuardError::Encoding { .. } => "encoding",
            GuardError::BinaryContent { .. } => "binary_content",
            GuardError::FileTooLarge { .. } => "file_too_large",
            GuardError::UnsafePath { .. } => "unsafe_path",
            GuardError::PathEscape { .. } => "path_escape",
            GuardError::UnsafeUrl { .. } => "unsafe_url",
            GuardError::Origin(_) => "origin",
            GuardError::RateLimited { .. } => "rate_limited",
            GuardError::Schema(_) => "schema",
            GuardError::UnknownCommand(_) => "unknown_command",
            GuardError::Parse(_) => "parse",
            GuardError::Handler(_) => "handler",
            GuardError::Io(_) => "io",
        }
    }

    /// Development rendering: user message plus detail, with absolute
    /// paths reduced to their final component.
    pub fn detailed_message(&self) -> String {
        format!(
            "{}: {}",
            self.user_message(),
            redact_paths(&self.to_string())
        )
    }
}

static ABSOLUTE_PATH: Lazy<Regex> = Lazy::new(|| {
    // Unix absolute paths and Windows drive paths, captured up to the basename.
    Regex::new(r#"(?:[A-Za-z]:[\\/]|/)(?:[^\s'"\\/]+[\\/])*([^\s'"\\/]+)"#)
        .expect("static path pattern")
});

/// Replace every absolute path in `message` with its basename.
///
/// ```
/// use mdguard::security::redact_paths;
///
/// assert_eq!(
///     redact_paths("failed to read /home/alice/notes/todo.md"),
///     "failed to read todo.md"
/// );
/// ```
pub fn redact_paths(message: &str) -> String {
    ABSOLUTE_PATH.replace_all(message, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_unix_paths() {
        assert_eq!(
            redact_paths("open /Users/bob/Documents/plan.md failed"),
            "open plan.md failed"
        );
        assert_eq!(redact_paths("read '/etc/passwd'"), "read 'passwd'");
    }

    #[test]
    fn redacts_windows_paths() {
        assert_eq!(
            redact_paths(r"cannot open C:\Users\bob\notes.md"),
            "cannot open notes.md"
        );
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(redact_paths("nothing to see"), "nothing to see");
    }

    #[test]
    fn user_messages_carry_no_detail() {
        let err = GuardError::UnsafePath {
            path: "/home/alice/private/image.png".into(),
            reason: "extension not allowed".into(),
        };
        assert!(!err.user_message().contains("alice"));
        assert!(err.to_string().contains("/home/alice"));
        assert!(!err.detailed_message().contains("/home/alice"));
        assert!(err.detailed_message().contains("image.png"));
    }

    #[test]
    fn url_rejections_share_protocol_message() {
        let blocked = GuardError::UnsafeUrl {
            reason: UrlRejection::BlockedProtocol("javascript:".into()),
        };
        let unlisted = GuardError::UnsafeUrl {
            reason: UrlRejection::UnlistedProtocol("ftp:".into()),
        };
        assert_eq!(blocked.user_message(), unlisted.user_message());
        assert_eq!(blocked.user_message(), "Only HTTP and HTTPS URLs are allowed");
    }

    #[test]
    fn handler_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("saving draft");
        let wrapped = GuardError::handler(err);
        assert_eq!(wrapped.to_string(), "handler failed: saving draft: disk full");
    }
}
