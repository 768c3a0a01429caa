use academy_kpi::cli::{self, Cli, Commands};
use academy_kpi::error::Result;
use clap::Parser;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod main_runtime;
use main_runtime::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli::load_config(&cli.config_dir)?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Check => {
            cli::check(&config).await?;
        }
        Commands::Snapshot { json } => {
            let (service, _store) = cli::build_service(&config).await?;
            let result = cli::snapshot(&service, json).await;
            service.stop().await;
            result?;
        }
        Commands::Watch { interval_secs } => {
            let (service, _store) = cli::build_service(&config).await?;
            service.start().await?;

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                trigger.cancel();
            });

            cli::watch(&service, Duration::from_secs(interval_secs.max(1)), cancel).await;
            service.stop().await;
        }
        Commands::Serve { port } => {
            let (service, store) = cli::build_service(&config).await?;
            service.start().await?;

            let port = port.unwrap_or(config.api.port);
            cli::serve(service.clone(), store, port, shutdown_signal()).await?;

            info!("Shutting down dashboard service");
            service.stop().await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
