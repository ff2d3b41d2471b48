//! Trust-boundary guards for mdguard.
//!
//! See [`mdguard`] for the module overview, architecture diagram,
//! and public API documentation.

mod content;
mod error;
mod html;
mod mdguard;
mod path_guard;
mod url_guard;

// The mdguard.rs facade controls the entire public API surface.
pub use self::mdguard::*;
