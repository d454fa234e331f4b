//! Status server
//!
//! Read-only HTTP and WebSocket surface over [`SharedState`] for the
//! dashboard. Handlers only ever take snapshots, so a slow client can never
//! hold up the controller.

pub mod health;
pub mod state;
pub mod websocket;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::shutdown::ShutdownListener;
use crate::state::{SharedState, Snapshot};
use crate::{Error, Result};

/// Read side of [`SharedState`] handed to the status surface
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    state: SharedState,
}

impl StatusPublisher {
    #[must_use]
    pub const fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Current device state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    /// Notified after every state update
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.state.subscribe()
    }
}

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub publisher: StatusPublisher,
    /// Closes open WebSocket connections on shutdown
    pub shutdown: ShutdownListener,
}

/// Status server
pub struct StatusServer {
    publisher: StatusPublisher,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl StatusServer {
    #[must_use]
    pub const fn new(publisher: StatusPublisher, port: u16) -> Self {
        Self {
            publisher,
            port,
            static_dir: None,
        }
    }

    /// Serve a dashboard page from this directory
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self, shutdown: ShutdownListener) -> Router {
        let state = Arc::new(ApiState {
            publisher: self.publisher.clone(),
            shutdown,
        });

        let mut router = Router::new()
            .merge(health::router())
            .merge(state::router(Arc::clone(&state)))
            .merge(websocket::router(state));

        // Serve static files if configured
        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir =
                ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // CORS layer for the dashboard page served from elsewhere
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the status server until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self, shutdown: ShutdownListener) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind status server on {addr}: {e}")))?;

        tracing::info!(port = self.port, "status server listening");

        let router = self.router(shutdown.clone());
        let mut stop = shutdown;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop.wait().await })
            .await?;

        tracing::info!("status server stopped");
        Ok(())
    }

    /// Run the status server in a background task
    #[must_use]
    pub fn spawn(self, shutdown: ShutdownListener) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
