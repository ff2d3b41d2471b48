//! CLI subcommand: `mdguard check`
//!
//! Runs a file through the same path, size, encoding and binary checks the
//! editor applies before opening a document.

use anyhow::Result;
use clap::Args;

use crate::document::DocumentLoader;
use crate::paths::Paths;
use crate::security::ValidationReport;

#[derive(Args)]
pub struct CheckArgs {
    /// File to check
    pub file: String,

    /// Print the validation report as JSON (includes the decoded content)
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: CheckArgs, paths: &Paths) -> Result<()> {
    let config = super::load_config(paths)?;
    let loader = DocumentLoader::from_config(&config);
    let result = loader.load(&args.file).await;

    if args.json {
        let report = ValidationReport::from(result.map(|doc| doc.content));
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.is_valid() {
            std::process::exit(1);
        }
        return Ok(());
    }

    match result {
        Ok(doc) => {
            println!(
                "OK  {} ({} bytes, {} lines)",
                doc.path.display(),
                doc.content.len(),
                doc.content.lines().count()
            );
            Ok(())
        }
        Err(e) => anyhow::bail!("{}: {}", args.file, e),
    }
}
