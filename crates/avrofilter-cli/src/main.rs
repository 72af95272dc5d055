mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        cli::Commands::Serve {
            host,
            port,
            upstream,
        } => commands::serve::handle(config, host, port, upstream).await,
        cli::Commands::Check => commands::check::handle(&config),
        cli::Commands::Resolve { datatype, roles } => {
            commands::resolve::handle(&config, &datatype, &roles)
        }
        cli::Commands::Redact {
            input,
            output,
            datatype,
            roles,
        } => commands::redact::handle(&config, &input, &output, &datatype, &roles),
    }
}
