//! mdguard - trust-boundary checks for a desktop markdown editor
//!
//! This crate provides:
//! - Content validation for bytes read from disk (UTF-8, binary heuristics)
//! - Path and URL guards for files and links the renderer asks for
//! - A rate-limited, origin-checked command gate and its localhost bridge
//! - HTML sanitization for copy-as-rich-text

pub mod cli;
pub mod clipboard;
pub mod commands;
pub mod config;
pub mod document;
pub mod gate;
pub mod handlers;
pub mod paths;
pub mod security;
pub mod server;

pub use config::Config;
