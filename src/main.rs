//! pdtools - command-line clients for a PhishDetect Node
//!
//! Submits indicators, synchronizes nodes and polls a node for new records
//! to forward to Pushover or MISP.

use clap::{CommandFactory, Parser};
use pdtools::{
    app,
    cli::{Cli, Command},
    config::Config,
    core::NodeApi,
    submit::SubmitError,
};
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Prints the subcommand's usage followed by `message`, then exits with the
/// status used for bad invocations.
fn usage_error(subcommand: &str, message: &str) -> ! {
    let mut cli = Cli::command();
    cli.build();
    if let Some(sub) = cli.find_subcommand_mut(subcommand) {
        let _ = sub.print_help();
    }
    println!("\nERROR: {}", message);
    process::exit(-1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        eprintln!("ERROR: {}", err);
        process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    let subcommand = cli.command.name();
    if let Err(err) = config.validate_for(&cli.command) {
        usage_error(subcommand, &err.to_string());
    }

    let status = match cli.command {
        Command::Send(args) => match app::run_send(&config, args).await {
            Ok(()) => 0,
            Err(err @ SubmitError::InputMode) => usage_error(subcommand, &err.to_string()),
            Err(err) if err.is_usage() => {
                println!("ERROR: {}", err);
                -1
            }
            Err(err) => {
                error!("Failed to submit indicators: {}", err);
                1
            }
        },
        Command::Sync(args) => match app::run_sync(&config, args).await {
            Ok(report) if report.has_failures() => 1,
            Ok(_) => 0,
            Err(err) => {
                error!("Synchronization failed: {:#}", err);
                1
            }
        },
        Command::Notify(_) => run_poller(&config, false).await,
        Command::Misp(_) => run_poller(&config, true).await,
    };

    process::exit(status);
}

async fn run_poller(config: &Config, misp: bool) -> i32 {
    let node: Arc<dyn NodeApi> = match app::node_client(config) {
        Ok(node) => Arc::new(node),
        Err(err) => {
            error!("{:#}", err);
            return 1;
        }
    };

    let poller = if misp {
        info!(
            "Syncing email reports from {} to {}",
            config.node.url,
            config.misp.url.as_deref().unwrap_or_default()
        );
        app::misp_poller(config, node)
    } else {
        app::notify_poller(config, node)
    };
    let poller = match poller {
        Ok(poller) => poller,
        Err(err) => {
            error!("{:#}", err);
            return 1;
        }
    };

    // =========================================================================
    // Shutdown Channel
    // =========================================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received. Finishing the current cycle...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Unable to listen for the shutdown signal: {}", e),
        }
        // The poller treats a dropped sender as shutdown.
        let _keep = shutdown_tx;
        std::future::pending::<()>().await;
    });

    match app::run_poller(poller, shutdown_rx).await {
        Ok(()) => {
            info!("Poller stopped. Exiting.");
            0
        }
        Err(err) => {
            error!("Poller stopped: {}", err);
            1
        }
    }
}
