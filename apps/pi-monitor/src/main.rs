//! Pi Monitor Binary
//!
//! Starts the metric producers and the HTTP server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin pi-monitor
//! ```
//!
//! # Environment Variables
//!
//! - `PI_MONITOR_HOST`: Bind interface (default: 0.0.0.0)
//! - `PI_MONITOR_PORT`: HTTP port (default: 8080)
//! - `PI_MONITOR_STATIC_DIR`: Front-end directory (default: web)
//! - `PI_MONITOR_SAMPLE_INTERVAL_MS`: Sampling interval (default: 1000)
//! - `PI_MONITOR_COMMAND_TIMEOUT_MS`: Per-command timeout (default: 5000)
//! - `PI_MONITOR_VCGENCMD`, `PI_MONITOR_FREE`: Tool paths
//! - `PI_MONITOR_OBSERVERS_EAGER`: Push viewer count on change (default: false)
//! - `PI_MONITOR_SUBSCRIBER_CAPACITY`: Per-viewer queue (default: 16)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: pi-monitor)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pi_monitor::infrastructure::telemetry;
use pi_monitor::{
    AppState, BrokerConfig, CommandSource, CommandSourceConfig, EventBroker, HttpServer,
    MetricSource, MonitorConfig, ProducerConfig, ProducerSet, init_metrics,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Pi Monitor");

    let _metrics_handle = init_metrics();

    let config = MonitorConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let broker = Arc::new(EventBroker::new(BrokerConfig::from(config.broker)));

    let source: Arc<dyn MetricSource> = Arc::new(CommandSource::new(CommandSourceConfig::from(
        &config.producers,
    )));
    let producers = ProducerSet::spawn(
        &source,
        &broker,
        ProducerConfig::from(&config.producers),
        &shutdown_token,
    );

    let state = Arc::new(AppState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&broker),
        producers.states(),
        shutdown_token.clone(),
    ));

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let server = HttpServer::new(
        bind_addr,
        config.server.static_dir.clone(),
        state,
        shutdown_token.clone(),
    );
    let server_task = tokio::spawn(server.serve(listener));

    tracing::info!("Pi Monitor ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        producers.join().await;
        server_task.await
    })
    .await;

    match drained {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server error"),
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out"
        ),
    }

    tracing::info!("Pi Monitor stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &MonitorConfig) {
    tracing::info!(
        addr = %config.bind_addr(),
        static_dir = %config.server.static_dir.display(),
        interval_ms = config.producers.interval.as_millis(),
        observers_eager = config.producers.observers_eager,
        subscriber_capacity = config.broker.subscriber_capacity,
        "Configuration loaded"
    );
    tracing::debug!(
        vcgencmd = %config.producers.vcgencmd,
        free = %config.producers.free,
        command_timeout_ms = config.producers.command_timeout.as_millis(),
        "Metric commands"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel everything.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
