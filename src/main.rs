// Main binary that starts the BMC service
use std::io::stderr;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use bmcd_engine::DriverRegistry;

mod api;
mod config;

use config::ServeArgs;

// Define the command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Out-of-band BMC power, boot and user management", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the BMC action service
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG, fall back to verbose/info for our crates
    let level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "bmcd={level},bmcd_engine={level},bmcd_drivers={level},tower=warn,hyper=warn,reqwest=warn,rustls=warn,h2=warn",
        level = level
    );
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry().with(filter).with(fmt::layer().with_writer(stderr)).init();

    debug!("Logging initialized");

    match cli.command {
        Some(Commands::Serve(args)) => serve(args).await,
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let registry = DriverRegistry::from_config(&args.registry_config())
        .wrap_err("Invalid driver configuration")?;
    info!(drivers = ?registry.driver_names(), "Driver priority");

    let state = api::AppState::new(Arc::new(registry), args.auth_resolver()?)
        .with_request_timeout(args.request_timeout())
        .with_status_channel(args.status_buffer, args.status_send_timeout());
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", args.listen))?;
    info!(
        "bmcd listening on http://{}",
        listener.local_addr().wrap_err("Failed to get local address")?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut signal) = signal(SignalKind::terminate()) {
            signal.recv().await;
            info!("Received SIGTERM");
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
