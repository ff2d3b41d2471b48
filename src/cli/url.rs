//! CLI subcommand: `mdguard url`

use anyhow::Result;
use clap::Args;

use crate::paths::Paths;
use crate::security::UrlGuard;

#[derive(Args)]
pub struct UrlArgs {
    /// URL to validate
    pub url: String,
}

pub fn run(args: UrlArgs, paths: &Paths) -> Result<()> {
    let config = super::load_config(paths)?;
    let report = UrlGuard::from_config(&config.urls).report(&args.url);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_valid {
        std::process::exit(1);
    }
    Ok(())
}
