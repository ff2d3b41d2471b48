//! CLI subcommand: `mdguard sanitize`
//!
//! Reads an HTML fragment from a file or stdin and prints what the editor
//! would place on the clipboard.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

use crate::clipboard::ClipboardPayload;
use crate::paths::Paths;
use crate::security::{HtmlSanitizer, SanitizationPolicy};

#[derive(Args)]
pub struct SanitizeArgs {
    /// HTML file to read (stdin when omitted)
    pub file: Option<PathBuf>,

    /// Print the plain-text form instead of HTML
    #[arg(long, conflicts_with = "json")]
    pub text: bool,

    /// Print both forms as a clipboard payload
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: SanitizeArgs, paths: &Paths) -> Result<()> {
    let config = super::load_config(paths)?;
    let sanitizer = HtmlSanitizer::new(SanitizationPolicy::from_config(&config.sanitizer));

    let html = match &args.file {
        Some(file) => tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?,
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read stdin")?;
            input
        }
    };

    if args.json {
        let payload = ClipboardPayload::build(&sanitizer, &html, None);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if args.text {
        println!("{}", sanitizer.plain_text(&html));
    } else {
        println!("{}", sanitizer.sanitize_html(&html));
    }
    Ok(())
}
