use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{Config, DEFAULT_CONFIG_TEMPLATE};
use crate::paths::Paths;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show {
        /// Output format: toml (default) or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Get a configuration value
    Get {
        /// Config key (e.g., commands.max_calls)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Config key (e.g., commands.max_calls)
        key: String,

        /// Value to set (lists are comma-separated)
        value: String,
    },

    /// Show config file path
    Path,

    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, paths: &Paths) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => show_config(paths, &format),
        ConfigCommands::Get { key } => get_config(paths, &key),
        ConfigCommands::Set { key, value } => set_config(paths, &key, &value),
        ConfigCommands::Path => {
            println!("{}", paths.config_file().display());
            Ok(())
        }
        ConfigCommands::Init { force } => init_config(paths, force),
    }
}

fn show_config(paths: &Paths, format: &str) -> Result<()> {
    let config = Config::load_with_paths(paths.clone())?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => println!("{}", toml::to_string_pretty(&config)?),
        other => anyhow::bail!("Unknown format '{}': expected toml or json", other),
    }

    Ok(())
}

fn get_config(paths: &Paths, key: &str) -> Result<()> {
    let config = Config::load_with_paths(paths.clone())?;
    println!("{}", config.get_value(key)?);
    Ok(())
}

fn set_config(paths: &Paths, key: &str, value: &str) -> Result<()> {
    let mut config = Config::load_with_paths(paths.clone())?;
    config.set_value(key, value)?;
    config.save()?;
    println!("Set {} = {}", key, config.get_value(key)?);
    Ok(())
}

fn init_config(paths: &Paths, force: bool) -> Result<()> {
    let path = paths.config_file();

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;

    println!("Created config file at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(dir.path());

        init_config(&paths, false).unwrap();
        assert!(init_config(&paths, false).is_err());
        init_config(&paths, true).unwrap();

        let content = std::fs::read_to_string(paths.config_file()).unwrap();
        assert_eq!(content, DEFAULT_CONFIG_TEMPLATE);
    }

    #[test]
    fn show_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(dir.path());
        init_config(&paths, false).unwrap();
        assert!(show_config(&paths, "yaml").is_err());
    }
}
