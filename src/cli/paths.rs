//! CLI subcommand: `mdguard paths`
//!
//! Prints all resolved XDG-compliant paths for debugging and scripting.

use crate::paths::Paths;

pub fn run(paths: &Paths) {
    println!("mdguard Paths (XDG Base Directory)");
    println!("==================================");
    println!();
    println!("Config:     {}", paths.config_dir.display());
    println!("  config.toml:    {}", paths.config_file().display());
    println!();
    println!("State:      {}", paths.state_dir.display());
    println!("  bridge file:    {}", paths.bridge_file().display());
    println!("  logs:           {}", paths.logs_dir().display());
    println!();
    println!("Cache:      {}", paths.cache_dir.display());
}
