use anyhow::Result;
use clap::Parser;

use mdguard::cli::{self, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let paths = cli.paths()?;

    // RUST_LOG wins, then --verbose, then [logging] level
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        cli::configured_log_level(&paths)
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    match cli.command {
        Commands::Check(args) => cli::check::run(args, &paths).await,
        Commands::Url(args) => cli::url::run(args, &paths),
        Commands::Sanitize(args) => cli::sanitize::run(args, &paths).await,
        Commands::Serve(args) => cli::serve::run(args, &paths).await,
        Commands::Commands => {
            cli::commands::run();
            Ok(())
        }
        Commands::Config(args) => cli::config::run(args, &paths),
        Commands::Paths => {
            cli::paths::run(&paths);
            Ok(())
        }
    }
}
