//! URL protocol guard for external link activation and export targets.
//!
//! Fail closed: a URL passes only when it parses, fits the length cap,
//! and its protocol is on the allowlist. The blocklist is consulted first
//! purely so the log says *why* (`javascript:` vs. an unknown scheme).
//!
//! The returned URL is the parser's re-serialization, never the raw input.

use serde::Serialize;
use tracing::warn;
use url::Url;

use super::error::{GuardError, UrlRejection};
use crate::config::UrlsConfig;

#[derive(Debug, Clone)]
pub struct UrlGuard {
    max_length: usize,
    /// Lowercase protocols including the trailing colon, e.g. `https:`.
    allowed: Vec<String>,
    blocked: Vec<String>,
}

/// Wire form of a URL check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlValidation {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<String, GuardError>> for UrlValidation {
    fn from(result: Result<String, GuardError>) -> Self {
        match result {
            Ok(url) => Self {
                is_valid: true,
                sanitized_url: Some(url),
                error: None,
            },
            Err(e) => Self {
                is_valid: false,
                sanitized_url: None,
                error: Some(e.user_message().to_string()),
            },
        }
    }
}

impl Default for UrlGuard {
    fn default() -> Self {
        Self::from_config(&UrlsConfig::default())
    }
}

impl UrlGuard {
    pub fn from_config(config: &UrlsConfig) -> Self {
        Self {
            max_length: config.max_length,
            allowed: config.allowed_protocols.iter().map(|p| normalize_protocol(p)).collect(),
            blocked: config.blocked_protocols.iter().map(|p| normalize_protocol(p)).collect(),
        }
    }

    /// Validate and normalize `input`.
    ///
    /// ```
    /// use mdguard::security::UrlGuard;
    ///
    /// let guard = UrlGuard::default();
    /// assert_eq!(
    ///     guard.validate("  HTTPS://Example.COM/a?b=c ").unwrap(),
    ///     "https://example.com/a?b=c"
    /// );
    /// assert!(guard.validate("javascript:alert(1)").is_err());
    /// ```
    pub fn validate(&self, input: &str) -> Result<String, GuardError> {
        self.check(input).map_err(|reason| {
            warn!(reason = %reason, "Rejected URL");
            GuardError::UnsafeUrl { reason }
        })
    }

    /// Same as [`validate`](Self::validate), in the wire shape.
    pub fn report(&self, input: &str) -> UrlValidation {
        self.validate(input).into()
    }

    fn check(&self, input: &str) -> Result<String, UrlRejection> {
        // Length first, before any parsing work.
        if input.len() > self.max_length {
            return Err(UrlRejection::TooLong {
                length: input.len(),
                max: self.max_length,
            });
        }

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(UrlRejection::Empty);
        }

        let parsed = Url::parse(trimmed).map_err(|e| UrlRejection::Malformed(e.to_string()))?;
        let protocol = format!("{}:", parsed.scheme().to_ascii_lowercase());

        if self.blocked.contains(&protocol) {
            return Err(UrlRejection::BlockedProtocol(protocol));
        }
        if !self.allowed.contains(&protocol) {
            return Err(UrlRejection::UnlistedProtocol(protocol));
        }

        Ok(parsed.to_string())
    }
}

/// `"HTTPS"`, `"https"` and `"https:"` all become `"https:"`.
fn normalize_protocol(p: &str) -> String {
    let lower = p.trim().to_ascii_lowercase();
    if lower.ends_with(':') {
        lower
    } else {
        format!("{}:", lower)
    }
}
