//! XDG Base Directory compliant path resolution.
//!
//! Every directory is resolved through a three-level fallback:
//! 1. mdguard-specific env var (MDGUARD_CONFIG_DIR, etc.)
//! 2. XDG env var (XDG_CONFIG_HOME, etc.) via `etcetera`
//! 3. Platform default (~/.config, etc.)
//!
//! All paths are absolute. Relative paths from env vars are ignored.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "mdguard";

/// Resolved directory paths for the application.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// State directory: bridge handshake file, logs
    pub state_dir: PathBuf,

    /// Cache directory
    pub cache_dir: PathBuf,

    /// Explicit config file from `--config`
    config_override: Option<PathBuf>,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "MDGUARD_CONFIG_DIR", || {
            strategy.config_dir().join(APP_DIR)
        });

        let state_dir = env_or(&env_fn, "MDGUARD_STATE_DIR", || {
            // state_dir() is None on platforms without XDG_STATE_HOME.
            let base_state = strategy.state_dir().unwrap_or_else(|| strategy.data_dir());
            base_state.join(APP_DIR)
        });

        let cache_dir = env_or(&env_fn, "MDGUARD_CACHE_DIR", || {
            strategy.cache_dir().join(APP_DIR)
        });

        Ok(Self {
            config_dir,
            state_dir,
            cache_dir,
            config_override: None,
        })
    }

    /// Use an explicit config file (`--config`). Every directory stays at
    /// its resolved location; the file's own directory is never created
    /// with restricted permissions.
    pub fn with_config_file(mut self, file: &Path) -> Self {
        let expanded = shellexpand::tilde(&file.to_string_lossy()).to_string();
        self.config_override = Some(PathBuf::from(expanded));
        self
    }

    // ── Convenience accessors for specific files ──

    /// Config file: config_dir/config.toml unless overridden
    pub fn config_file(&self) -> PathBuf {
        self.config_override
            .clone()
            .unwrap_or_else(|| self.config_dir.join("config.toml"))
    }

    /// Bridge handshake: state_dir/bridge.json (address and sender id of a
    /// running `mdguard serve`)
    pub fn bridge_file(&self) -> PathBuf {
        self.state_dir.join("bridge.json")
    }

    /// Logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    /// Create all directories with appropriate permissions.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.state_dir, &self.cache_dir] {
            create_dir_with_mode(dir)?;
        }
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::resolve().unwrap_or_else(|_| {
            let home = etcetera::home_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self {
                config_dir: home.join(".config").join(APP_DIR),
                state_dir: home.join(".local").join("state").join(APP_DIR),
                cache_dir: home.join(".cache").join(APP_DIR),
                config_override: None,
            }
        })
    }
}

/// Resolve an env var with fallback. Ignores empty and relative paths.
fn env_or<F>(env_fn: &F, var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    env_fn(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(default)
}

/// Create a directory with mode 0700.
fn create_dir_with_mode(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}
