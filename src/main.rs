//! apiban-nft-client - APIBAN feed to nftables set synchronizer
//!
//! One invocation performs one synchronization run and exits.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

use apiban_nft_client::bootstrap::ensure_set;
use apiban_nft_client::cli::Cli;
use apiban_nft_client::cmd_abstraction::DEFAULT_COMMAND_TIMEOUT;
use apiban_nft_client::config::ApibanConfig;
use apiban_nft_client::enforcer::{check_root, create_backend};
use apiban_nft_client::error::{ApibanError, EXIT_FAILURE};
use apiban_nft_client::fetcher::{ApibanClient, ClientOptions};
use apiban_nft_client::lock::LockGuard;
use apiban_nft_client::logging;
use apiban_nft_client::sync::{SyncOptions, SyncOutcome, Syncer};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let log_file = cli.log_file();
    let _guard = match logging::init(log_file.as_deref(), cli.verbose, cli.quiet) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    info!("** client start (apiban-nft-client {})", env!("CARGO_PKG_VERSION"));

    match run(&cli).await {
        Ok(()) => {
            info!("** Done. Exiting.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<ApibanError>()
                .map(ApibanError::exit_code)
                .unwrap_or(EXIT_FAILURE);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    check_root()?;
    let _lock = LockGuard::acquire()?;

    let now = chrono::Utc::now().timestamp();
    let mut config = ApibanConfig::load(cli.config.as_deref(), now)?;

    let firewall = create_backend(DEFAULT_COMMAND_TIMEOUT);
    let set = ensure_set(&firewall, &config.set_name).await?;

    let feed = ApibanClient::new(ClientOptions {
        verify_tls: cli.verify,
        ..Default::default()
    })
    .context("Failed to set up the APIBAN client")?;

    let options = SyncOptions {
        full: cli.full(),
        ..Default::default()
    };
    let report = Syncer::new(&firewall, &feed, options)
        .run(&mut config, &set, now)
        .await?;

    let how = match report.outcome {
        SyncOutcome::NoChange => "up to date",
        SyncOutcome::EndOfData => "end of feed data",
        SyncOutcome::PageLimit => "page limit reached",
    };
    info!(
        "Run finished ({}): {} fetches, {} added, {} failed",
        how, report.fetches, report.added, report.failed
    );
    Ok(())
}
