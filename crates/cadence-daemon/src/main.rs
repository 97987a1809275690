//! Entrypoint: loads config, initialises logging, starts the daemon,
//! and waits for ctrl-c to trigger a graceful shutdown.

use anyhow::Result;
use cadence_core::config::Config;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("failed to load config, using defaults: {e}");
        Config::default()
    });

    cadence_telemetry::logging::init_logging("cadence-daemon", &config.general.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "cadence-daemon starting"
    );

    let daemon = match cadence_daemon::daemon::Daemon::start(config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!(error = %e, "failed to start daemon");
            std::process::exit(1);
        }
    };

    info!(api_port = daemon.api_port(), "cadence-daemon ready");

    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    if let Err(e) = daemon.wait().await {
        tracing::error!(error = %e, "daemon exited with error");
        std::process::exit(1);
    }

    Ok(())
}
