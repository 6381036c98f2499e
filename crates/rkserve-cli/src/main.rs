//! rkserve entry point.

use std::process::ExitCode;

use clap::Parser;
use rkserve_cli::{Cli, CliError, bootstrap};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before clap reads RKSERVE_*
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    let ctx = bootstrap(cli)?;
    let listener = TcpListener::bind(&ctx.bind_addr).await?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {e}");
                return;
            }
        }
        shutdown.cancel();
    });

    rkserve_proxy::serve(listener, ctx.state, cancel).await?;
    Ok(())
}
