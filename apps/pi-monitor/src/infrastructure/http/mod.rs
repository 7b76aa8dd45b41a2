//! HTTP Server
//!
//! Serves the live event stream, the web front-end and the health endpoints
//! on a single port.
//!
//! # Endpoints
//!
//! - `GET /status` - Server-Sent Events stream of every metric
//! - `GET /health`, `/healthz`, `/readyz`, `/metrics` - see [`health`](crate::infrastructure::health)
//! - anything else - static files from the configured front-end directory

pub mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::application::services::ProducerState;
use crate::infrastructure::broker::SharedBroker;
use crate::infrastructure::health;

pub use session::{SessionError, StreamingSession, status_handler};

// =============================================================================
// Application State
// =============================================================================

/// State shared by every request handler.
pub struct AppState {
    pub(crate) version: String,
    pub(crate) started_at: Instant,
    pub(crate) broker: SharedBroker,
    pub(crate) producers: Vec<Arc<ProducerState>>,
    pub(crate) shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        version: String,
        broker: SharedBroker,
        producers: Vec<Arc<ProducerState>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            broker,
            producers,
            shutdown,
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    let front_end = ServeDir::new(static_dir).append_index_html_on_directories(true);

    Router::new()
        .route("/status", get(status_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .fallback_service(front_end)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// The monitor's HTTP server.
pub struct HttpServer {
    addr: String,
    static_dir: PathBuf,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(
        addr: String,
        static_dir: PathBuf,
        state: Arc<AppState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr,
            static_dir,
            state,
            cancel,
        }
    }

    /// Bind and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.addr.clone(), e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// Open streams end when the cancellation token fires, so shutdown
    /// does not wait on connected browsers.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the HTTP server fails while running.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let app = router(self.state, &self.static_dir);

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, static_dir = %self.static_dir.display(), "HTTP server listening");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(String, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
