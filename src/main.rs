//! rollcalld - admission daemon.
//!
//! Opens the store, starts the invitation sweeper and, when configured, the
//! Prometheus endpoint. Embedders drive admissions through the library.

use rollcall::config::{Config, validation};
use rollcall::{AdmissionService, Database, LogSink, SqliteScopeLookup, SystemClock};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. ROLLCALL_LOG_JSON switches to one JSON object per line.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os("ROLLCALL_LOG_JSON").is_some() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rollcall.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s) in {config_path}",
            errors.len()
        ));
    }

    info!(
        database = %config.database.path,
        invitation_window_secs = config.admission.invitation_window_secs,
        "Starting rollcalld"
    );

    let db = Database::new(&config.database.path).await?;

    rollcall::metrics::init();
    if let Some(metrics) = &config.metrics {
        tokio::spawn(rollcall::http::run_http_server(metrics.port));
    }

    let sweep_interval = config.admission.sweep_interval();
    let service = Arc::new(AdmissionService::new(
        db.clone(),
        Arc::new(SqliteScopeLookup::new(db)),
        Arc::new(LogSink),
        Arc::new(SystemClock),
        config.admission,
    ));
    let sweeper = rollcall::spawn_invitation_sweeper(Arc::clone(&service), sweep_interval);

    info!("rollcalld ready");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    sweeper.abort();
    service.flush_notifications().await;
    Ok(())
}
