//! copima — resumable GitLab-compatible GraphQL crawler
//!
//! Single-binary CLI driving the four subcommands in spec §6: `auth` (OAuth2
//! authorization-code protocol boundary), `crawl` (the four-phase pipeline),
//! `config` (inspect/edit the effective five-layer configuration), and
//! `test` (out of scope — see module docs).

mod cli;
mod commands;
mod error;

use copima_config::ConfigResolver;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Command, ParsedArgs};
use crate::error::Error;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            let code = e.exit_code();
            error!(kind = ?e.kind().map(|k| k.tag()), error = %e, "copima exited with an error");
            eprintln!("error: {}: {e}", e.kind().map(|k| k.tag()).unwrap_or("usage"));
            code
        }
    };
    std::process::exit(exit_code);
}

async fn run() -> error::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let ParsedArgs { command, flags } = cli::parse(&args).map_err(|e| Error::Usage(e.to_string()))?;

    let resolver = ConfigResolver::new();
    let env_layer = copima_config::env_layer();
    let cli_layer = flags.as_config_layer();

    if let Command::Config(cmd) = &command {
        let resolved = resolver.resolve(env_layer, cli_layer);
        return commands::config::run(cmd, &resolver, resolved).await;
    }

    let config = resolver.resolve(env_layer, cli_layer)?;

    match command {
        Command::Auth { provider } => {
            commands::auth::run(&config, &provider).await?;
        }
        Command::Crawl { phases } => {
            info!(phases = ?phases.iter().map(|p| p.as_str()).collect::<Vec<_>>(), "starting crawl");
            let reports = commands::crawl::run(&config, &phases, flags.account_id.as_deref()).await?;
            for report in &reports {
                info!(
                    phase = %report.phase,
                    outcome = ?report.outcome,
                    processed = report.processed,
                    failed = report.failed,
                    "phase complete"
                );
                println!("{}: {:?} ({} processed, {} failed)", report.phase, report.outcome, report.processed, report.failed);
            }
        }
        Command::Test => {
            return Err(Error::Usage("the `test` command (end-to-end test-report rendering) is out of scope for this crate".to_string()));
        }
        Command::Config(_) => unreachable!("handled above"),
    }

    Ok(())
}
