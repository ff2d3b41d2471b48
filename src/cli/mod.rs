pub mod check;
pub mod commands;
pub mod config;
pub mod paths;
pub mod sanitize;
pub mod serve;
pub mod url;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;

use crate::config::Config;
use crate::paths::Paths;

#[derive(Parser)]
#[command(name = "mdguard")]
#[command(
    author,
    version,
    about = "Trust-boundary checks for a desktop markdown editor"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "MDGUARD_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a file the way the editor would before opening it
    Check(check::CheckArgs),

    /// Validate a URL for opening in the system browser
    Url(url::UrlArgs),

    /// Sanitize HTML for the clipboard
    Sanitize(sanitize::SanitizeArgs),

    /// Run the localhost command bridge
    Serve(serve::ServeArgs),

    /// List the commands a renderer may invoke
    Commands,

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show resolved XDG directory paths
    Paths,
}

impl Cli {
    /// Paths with `--config` applied.
    pub fn paths(&self) -> Result<Paths> {
        let paths = Paths::resolve()?;
        Ok(match self.config.as_deref() {
            Some(file) => paths.with_config_file(Path::new(file)),
            None => paths,
        })
    }
}

/// Load config for a subcommand, creating the template on first run.
pub(crate) fn load_config(paths: &Paths) -> Result<Config> {
    Config::load_with_paths(paths.clone())
}

/// The configured log level, without touching the filesystem beyond a read.
/// Falls back to `info` when there is no readable config yet.
pub fn configured_log_level(paths: &Paths) -> String {
    std::fs::read_to_string(paths.config_file())
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.logging.level)
        .unwrap_or_else(|| "info".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["mdguard", "url", "https://a.b", "-v", "-c", "/tmp/x.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("/tmp/x.toml"));
        assert!(matches!(cli.command, Commands::Url(_)));
    }

    #[test]
    fn log_level_falls_back_to_info() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::resolve()
            .unwrap()
            .with_config_file(&dir.path().join("missing.toml"));
        assert_eq!(configured_log_level(&paths), "info");

        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[logging]\nlevel = \"warn\"\n").unwrap();
        let paths = Paths::resolve().unwrap().with_config_file(&file);
        assert_eq!(configured_log_level(&paths), "warn");
    }
}
