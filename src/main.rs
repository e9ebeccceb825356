use midas_extract::config::Config;
use midas_extract::request::{run_extract, run_stations, JobRequest};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,midas_extract=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("MIDAS extraction job runner starting...");

    let config_path = std::env::var("MIDAS_EXTRACT_CONFIG")
        .unwrap_or_else(|_| "config/config.yaml".to_string());
    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration from {}: {}\n\n\
             Make sure:\n\
             1. The config file exists (or set MIDAS_EXTRACT_CONFIG)\n\
             2. All required environment variables are set\n\
             3. Create a .env file if needed",
            config_path,
            e
        )
    })?;
    info!("Configuration loaded from {}", config_path);

    let request_path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("Usage: midas-extract <request.yaml>"))?;
    let request = JobRequest::load(&request_path)?;
    info!("Request loaded from {}", request_path);

    // Set up shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // The pipeline is synchronous file scanning; run it off the runtime.
    let result = tokio::task::spawn_blocking(move || match request {
        JobRequest::Stations(job) => run_stations(&config, &job).map(|stations| stations.len()),
        JobRequest::Extract(job) => run_extract(&config, &job, Some(shutdown_rx)),
    })
    .await?;

    match result {
        Ok(count) => info!("Job complete: {} record(s)", count),
        Err(e) => {
            error!("Job failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
