use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use application::supervisor::{AutoscaleManager, RunOutcome};
use infrastructure::config::Config;
use infrastructure::launcher::CommandLauncher;
use infrastructure::metrics::HttpMetricsSource;
use presentation::Dashboard;

/// Autoscaling supervisor for queue worker processes.
#[derive(Debug, Parser)]
#[command(name = "surge", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "surge.toml")]
    config: PathBuf,

    /// Render the terminal dashboard instead of running headless.
    #[arg(long)]
    dashboard: bool,

    /// Log filter when RUST_LOG is unset, e.g. "info" or "surge=debug".
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %cli.config.display(), error = %e, "cannot start");
            return ExitCode::from(2);
        }
    };

    let metrics = Arc::new(HttpMetricsSource::new(config.metrics_url.clone()));
    let launcher = Arc::new(CommandLauncher::new(config.worker.clone()));

    let (manager, snapshots) = match AutoscaleManager::new(config, metrics, launcher) {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(error = %e, "cannot start");
            return ExitCode::from(2);
        }
    };
    let mut manager = manager.with_config_path(&cli.config);

    let dashboard_thread = if cli.dashboard {
        Some(std::thread::spawn(move || {
            if let Err(e) = Dashboard::new(snapshots).run() {
                tracing::error!(error = %e, "dashboard failed");
            }
        }))
    } else {
        drop(snapshots);
        None
    };

    let outcome = manager.run().await;

    // Dropping the manager closes the snapshot channel, which releases the
    // dashboard thread if it is still drawing.
    drop(manager);
    if let Some(handle) = dashboard_thread {
        let _ = handle.join();
    }

    match outcome {
        Ok(RunOutcome::Shutdown) => ExitCode::SUCCESS,
        Ok(RunOutcome::MetricsExhausted) => ExitCode::from(3),
        Err(e) => {
            tracing::error!(error = %e, "supervisor failed");
            ExitCode::FAILURE
        }
    }
}
