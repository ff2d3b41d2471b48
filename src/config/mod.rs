use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use crate::paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    #[serde(default)]
    pub content: ContentConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub urls: UrlsConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Largest document accepted, in bytes (0 = unlimited)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Share of control characters above which text counts as binary
    #[serde(default = "default_binary_control_ratio")]
    pub binary_control_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Extensions that may be opened as documents, without the dot
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlsConfig {
    #[serde(default = "default_url_max_length")]
    pub max_length: usize,

    #[serde(default = "default_allowed_protocols")]
    pub allowed_protocols: Vec<String>,

    #[serde(default = "default_blocked_protocols")]
    pub blocked_protocols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Calls allowed per sender and command within one window
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// How often idle rate-limit entries are purged
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default)]
    pub error_detail: ErrorDetailMode,
}

/// How much of an error reaches the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorDetailMode {
    /// Detailed in debug builds, generic in release builds
    #[default]
    Auto,
    Generic,
    Detailed,
}

impl ErrorDetailMode {
    /// Whether errors carry detail, with `Auto` resolved for this build.
    pub fn is_detailed(self) -> bool {
        match self {
            ErrorDetailMode::Auto => cfg!(debug_assertions),
            ErrorDetailMode::Generic => false,
            ErrorDetailMode::Detailed => true,
        }
    }
}

impl FromStr for ErrorDetailMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ErrorDetailMode::Auto),
            "generic" => Ok(ErrorDetailMode::Generic),
            "detailed" => Ok(ErrorDetailMode::Detailed),
            other => anyhow::bail!(
                "Invalid error_detail '{}' (expected auto, generic or detailed)",
                other
            ),
        }
    }
}

impl fmt::Display for ErrorDetailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorDetailMode::Auto => "auto",
            ErrorDetailMode::Generic => "generic",
            ErrorDetailMode::Detailed => "detailed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// HTML inputs larger than this sanitize to nothing (0 = unlimited)
    #[serde(default = "default_sanitizer_max_input")]
    pub max_input_bytes: usize,

    #[serde(default = "default_sanitizer_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_binary_control_ratio() -> f64 {
    0.1
}
fn default_allowed_extensions() -> Vec<String> {
    vec!["md".into(), "markdown".into()]
}
fn default_url_max_length() -> usize {
    2048
}
fn default_allowed_protocols() -> Vec<String> {
    vec!["http:".into(), "https:".into()]
}
fn default_blocked_protocols() -> Vec<String> {
    [
        "javascript:",
        "vbscript:",
        "data:",
        "file:",
        "blob:",
        "about:",
        "chrome:",
        "chrome-extension:",
        "ms-settings:",
        "view-source:",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}
fn default_max_calls() -> usize {
    100
}
fn default_window_ms() -> u64 {
    60_000
}
fn default_sweep_interval() -> u64 {
    300
}
fn default_sanitizer_max_input() -> usize {
    5 * 1024 * 1024
}
fn default_sanitizer_max_depth() -> usize {
    512
}
fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    31337
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            binary_control_ratio: default_binary_control_ratio(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl Default for UrlsConfig {
    fn default() -> Self {
        Self {
            max_length: default_url_max_length(),
            allowed_protocols: default_allowed_protocols(),
            blocked_protocols: default_blocked_protocols(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            window_ms: default_window_ms(),
            sweep_interval_secs: default_sweep_interval(),
            error_detail: ErrorDetailMode::default(),
        }
    }
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: default_sanitizer_max_input(),
            max_depth: default_sanitizer_max_depth(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_port(),
            bind: default_bind(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default location, creating it from the template on
    /// first run.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(Paths::resolve()?)
    }

    pub fn load_with_paths(paths: Paths) -> Result<Self> {
        paths.ensure_dirs()?;
        let path = paths.config_file();

        if !path.exists() {
            let config = Config {
                paths,
                ..Config::default()
            };
            config.save_with_template()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.paths = paths;
        config.validate()?;

        Ok(config)
    }

    /// Reject values no guard can work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.content.binary_control_ratio) {
            anyhow::bail!(
                "content.binary_control_ratio must be between 0 and 1, got {}",
                self.content.binary_control_ratio
            );
        }
        if self.commands.max_calls == 0 {
            anyhow::bail!("commands.max_calls must be at least 1");
        }
        if self.commands.window_ms == 0 {
            anyhow::bail!("commands.window_ms must be at least 1");
        }
        if self.commands.sweep_interval_secs == 0 {
            anyhow::bail!("commands.sweep_interval_secs must be at least 1");
        }
        if self.files.allowed_extensions.is_empty() {
            anyhow::bail!("files.allowed_extensions must not be empty");
        }
        if self.urls.allowed_protocols.is_empty() {
            anyhow::bail!("urls.allowed_protocols must not be empty");
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.paths.config_file()
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["content", "max_bytes"] => Ok(self.content.max_bytes.to_string()),
            ["content", "binary_control_ratio"] => {
                Ok(self.content.binary_control_ratio.to_string())
            }
            ["files", "allowed_extensions"] => Ok(self.files.allowed_extensions.join(",")),
            ["urls", "max_length"] => Ok(self.urls.max_length.to_string()),
            ["urls", "allowed_protocols"] => Ok(self.urls.allowed_protocols.join(",")),
            ["urls", "blocked_protocols"] => Ok(self.urls.blocked_protocols.join(",")),
            ["commands", "max_calls"] => Ok(self.commands.max_calls.to_string()),
            ["commands", "window_ms"] => Ok(self.commands.window_ms.to_string()),
            ["commands", "sweep_interval_secs"] => {
                Ok(self.commands.sweep_interval_secs.to_string())
            }
            ["commands", "error_detail"] => Ok(self.commands.error_detail.to_string()),
            ["sanitizer", "max_input_bytes"] => Ok(self.sanitizer.max_input_bytes.to_string()),
            ["sanitizer", "max_depth"] => Ok(self.sanitizer.max_depth.to_string()),
            ["server", "enabled"] => Ok(self.server.enabled.to_string()),
            ["server", "port"] => Ok(self.server.port.to_string()),
            ["server", "bind"] => Ok(self.server.bind.clone()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["content", "max_bytes"] => self.content.max_bytes = value.parse()?,
            ["content", "binary_control_ratio"] => {
                self.content.binary_control_ratio = value.parse()?
            }
            ["files", "allowed_extensions"] => self.files.allowed_extensions = split_list(value),
            ["urls", "max_length"] => self.urls.max_length = value.parse()?,
            ["urls", "allowed_protocols"] => self.urls.allowed_protocols = split_list(value),
            ["urls", "blocked_protocols"] => self.urls.blocked_protocols = split_list(value),
            ["commands", "max_calls"] => self.commands.max_calls = value.parse()?,
            ["commands", "window_ms"] => self.commands.window_ms = value.parse()?,
            ["commands", "sweep_interval_secs"] => {
                self.commands.sweep_interval_secs = value.parse()?
            }
            ["commands", "error_detail"] => self.commands.error_detail = value.parse()?,
            ["sanitizer", "max_input_bytes"] => self.sanitizer.max_input_bytes = value.parse()?,
            ["sanitizer", "max_depth"] => self.sanitizer.max_depth = value.parse()?,
            ["server", "enabled"] => self.server.enabled = value.parse()?,
            ["server", "port"] => self.server.port = value.parse()?,
            ["server", "bind"] => self.server.bind = value.to_string(),
            ["logging", "level"] => self.logging.level = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        self.validate()
    }
}

/// `"md, markdown"` → `["md", "markdown"]`
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default config template with helpful comments (used for first-time setup)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# mdguard Configuration
# Auto-created on first run. Edit as needed.

[content]
# Largest document that will be opened, in bytes (0 = unlimited)
max_bytes = 52428800
# Text with a larger share of control characters is treated as binary
binary_control_ratio = 0.1

[files]
allowed_extensions = ["md", "markdown"]

[urls]
max_length = 2048
allowed_protocols = ["http:", "https:"]
# blocked_protocols = ["javascript:", "vbscript:", "data:", "file:", "blob:", "about:"]

[commands]
# Sliding-window rate limit per sender and command
max_calls = 100
window_ms = 60000
sweep_interval_secs = 300
# auto | generic | detailed (auto = detailed in debug builds only)
error_detail = "auto"

[sanitizer]
max_input_bytes = 5242880
max_depth = 512

[server]
enabled = true
port = 31337
bind = "127.0.0.1"

[logging]
level = "info"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        let defaults = Config::default();
        assert_eq!(config.content.max_bytes, defaults.content.max_bytes);
        assert_eq!(config.files.allowed_extensions, defaults.files.allowed_extensions);
        assert_eq!(config.urls.allowed_protocols, defaults.urls.allowed_protocols);
        assert_eq!(config.urls.blocked_protocols, defaults.urls.blocked_protocols);
        assert_eq!(config.commands.max_calls, defaults.commands.max_calls);
        assert_eq!(config.commands.error_detail, ErrorDetailMode::Auto);
        assert_eq!(config.sanitizer.max_depth, defaults.sanitizer.max_depth);
        assert_eq!(config.server.port, defaults.server.port);
        config.validate().unwrap();
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: Config = toml::from_str("[commands]\nmax_calls = 3\n").unwrap();
        assert_eq!(config.commands.max_calls, 3);
        assert_eq!(config.commands.window_ms, 60_000);
        assert_eq!(config.urls.max_length, 2048);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn get_and_set_dotted_keys() {
        let mut config = Config::default();
        config.set_value("commands.window_ms", "1000").unwrap();
        assert_eq!(config.get_value("commands.window_ms").unwrap(), "1000");

        config.set_value("files.allowed_extensions", "md, txt").unwrap();
        assert_eq!(config.files.allowed_extensions, vec!["md", "txt"]);

        config.set_value("commands.error_detail", "Generic").unwrap();
        assert_eq!(config.get_value("commands.error_detail").unwrap(), "generic");

        assert!(config.get_value("nope.key").is_err());
        assert!(config.set_value("server.port", "not-a-port").is_err());
    }

    #[test]
    fn set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set_value("content.binary_control_ratio", "1.5").is_err());
        assert!(config.set_value("commands.max_calls", "0").is_err());
        assert!(config.set_value("commands.error_detail", "verbose").is_err());
    }

    fn temp_paths(root: &std::path::Path) -> Paths {
        let root = root.to_path_buf();
        Paths::resolve_with_env(move |key: &str| match key {
            "MDGUARD_CONFIG_DIR" => Ok(root.join("config").display().to_string()),
            "MDGUARD_STATE_DIR" => Ok(root.join("state").display().to_string()),
            "MDGUARD_CACHE_DIR" => Ok(root.join("cache").display().to_string()),
            _ => Err(std::env::VarError::NotPresent),
        })
        .unwrap()
    }

    #[test]
    fn first_load_writes_template() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = temp_paths(tmp.path());
        let file = paths.config_file();

        let config = Config::load_with_paths(paths.clone()).unwrap();
        assert!(file.exists());
        assert_eq!(fs::read_to_string(&file).unwrap(), DEFAULT_CONFIG_TEMPLATE);
        assert_eq!(config.commands.max_calls, 100);

        fs::write(&file, "[urls]\nmax_length = 64\n").unwrap();
        let config = Config::load_with_paths(paths).unwrap();
        assert_eq!(config.urls.max_length, 64);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = temp_paths(tmp.path()).with_config_file(&tmp.path().join("bad.toml"));
        fs::write(paths.config_file(), "[content]\nbinary_control_ratio = -1.0\n").unwrap();
        assert!(Config::load_with_paths(paths).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn explicit_config_file_leaves_its_directory_alone() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        fs::create_dir(&project).unwrap();
        fs::set_permissions(&project, fs::Permissions::from_mode(0o755)).unwrap();

        let paths = temp_paths(tmp.path()).with_config_file(&project.join("mdguard.toml"));
        let config = Config::load_with_paths(paths).unwrap();
        assert!(project.join("mdguard.toml").exists());
        assert_eq!(config.config_path(), project.join("mdguard.toml"));

        let mode = fs::metadata(&project).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn explicit_config_file_creates_missing_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("nested").join("dir").join("mdguard.toml");
        let paths = temp_paths(tmp.path()).with_config_file(&file);
        Config::load_with_paths(paths).unwrap();
        assert!(file.exists());
    }
}
