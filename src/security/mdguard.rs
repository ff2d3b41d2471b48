//! # mdguard Security Module
//!
//! Every trust boundary the editor crosses has exactly one guard, and every
//! guard is re-exported from this file.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  mdguard.rs (you are here)                       │
//! │                  Public API facade & documentation               │
//! ├───────────────┬────────────────┬───────────────┬────────────────┤
//! │  content.rs   │ path_guard.rs  │ url_guard.rs  │   html.rs      │
//! │  Bytes → text │ Extension      │ Protocol      │ Allowlist      │
//! │  UTF-8 + NUL  │ allowlist,     │ allow/block,  │ rebuild of     │
//! │  + control    │ containment    │ normalization │ clipboard HTML │
//! │  ratio        │                │               │                │
//! ├───────────────┴────────────────┴───────────────┴────────────────┤
//! │  error.rs — GuardError taxonomy, user-safe messages, redaction  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The command gate (`crate::gate`) sits on top of these and is the only
//! place errors are turned into wire envelopes.
//!
//! ## Security Model
//!
//! 1. **Fail closed**: anything a guard cannot fully classify is rejected.
//!    The sanitizer returns an empty string rather than partial output.
//!
//! 2. **Never corrupt**: accepted content is returned byte-for-byte (minus
//!    a leading BOM). Guards reject; they do not repair.
//!
//! 3. **Allowlists over blocklists**: extensions, URL protocols, elements
//!    and attributes must be listed to pass. Blocklists only sharpen the
//!    logged reason.
//!
//! 4. **Quiet errors**: user-facing messages never carry paths or parser
//!    output. Detail goes to `tracing` and, in development mode, to the
//!    envelope with absolute paths reduced to basenames.
//!
//! ## Quick Start
//!
//! ```rust
//! use mdguard::security::{ContentValidator, HtmlSanitizer, PathGuard, UrlGuard};
//!
//! assert!(PathGuard::default().is_safe("notes/today.md"));
//! assert!(ContentValidator::default().validate(b"# Title\n").is_ok());
//! assert!(UrlGuard::default().validate("javascript:alert(1)").is_err());
//! assert_eq!(
//!     HtmlSanitizer::default().sanitize_html("<b onclick=\"x()\">hi</b>"),
//!     "<b>hi</b>"
//! );
//! ```
//!
//! ## Threat Model
//!
//! | Threat | Defense Layer |
//! |--------|--------------|
//! | Binary or mis-encoded file opened as a document | ContentValidator |
//! | Non-markdown file opened via dialog or drag-drop | PathGuard |
//! | Image reference climbing out of the document folder | `is_within` |
//! | `javascript:` / `file:` link activated | UrlGuard |
//! | Script or handler smuggled into clipboard HTML | HtmlSanitizer |
//! | Stale or forged renderer calling commands | Gate origin check |
//! | Command flooding | Gate rate limiter |
//! | Paths leaking through error text | `redact_paths` |

// ── Errors ──────────────────────────────────────────────────────────

pub use super::error::{GuardError, UrlRejection, redact_paths};

// ── Content ─────────────────────────────────────────────────────────

pub use super::content::{
    ContentValidator, UTF8_BOM, ValidationReport, ValidationResult, accept_utf8,
};

// ── Paths ───────────────────────────────────────────────────────────

pub use super::path_guard::{PathGuard, is_within, resolve_absolute, resolve_within};

// ── URLs ────────────────────────────────────────────────────────────

pub use super::url_guard::{UrlGuard, UrlValidation};

// ── HTML ────────────────────────────────────────────────────────────

pub use super::html::{DANGEROUS_ELEMENTS, HtmlSanitizer, SanitizationPolicy, sanitize_text};
