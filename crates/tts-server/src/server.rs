//! TTS server: router, shared state and lifecycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use runtime::TtsRuntime;
use tts_core::{AppConfig, TtsError, TtsResult};

use crate::routes;

/// Shared server state.
pub struct AppState {
    /// Voices, resolver and synthesis paths.
    pub runtime: TtsRuntime,
    /// Effective configuration.
    pub config: AppConfig,
    /// Prometheus handle when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
    /// Server start time.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(runtime: TtsRuntime, config: AppConfig, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            runtime,
            config,
            metrics,
            start_time: Instant::now(),
        }
    }
}

/// Build the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/info", get(routes::info))
        .route("/metrics", get(routes::metrics))
        .route("/api/voices", get(routes::list_voices))
        .route("/api/tts", get(routes::tts_get).post(routes::tts_post))
        .layer(RequestBodyLimitLayer::new(state.config.server.max_body_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The main TTS server.
pub struct TtsServer {
    state: Arc<AppState>,
}

impl TtsServer {
    /// Load voices as configured and create the server.
    pub fn new(config: AppConfig, metrics: Option<PrometheusHandle>) -> Self {
        let runtime = TtsRuntime::load(&config);
        Self::with_runtime(config, runtime, metrics)
    }

    /// Create a server around an existing runtime.
    pub fn with_runtime(
        config: AppConfig,
        runtime: TtsRuntime,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            state: Arc::new(AppState::new(runtime, config, metrics)),
        }
    }

    /// Shared state, as handed to the router.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Serve until SIGINT/SIGTERM, then drain for at most the shutdown timeout.
    pub async fn run(self) -> TtsResult<()> {
        let server_config = &self.state.config.server;
        let addr = format!("{}:{}", server_config.host, server_config.port);
        let shutdown_timeout = Duration::from_secs(server_config.shutdown_timeout_secs);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TtsError::config(format!("cannot bind {addr}: {e}")))?;

        let registry = self.state.runtime.registry();
        if registry.is_empty() {
            warn!(
                dir = %self.state.config.voices.dir.display(),
                "No voices loaded, synthesis requests will fail with 503"
            );
        } else {
            info!(count = registry.len(), voices = ?registry.keys(), "Ready");
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let app = create_router(Arc::clone(&self.state));

        info!(addr = %addr, "Starting HTTP server");
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.changed().await.ok();
                })
                .await
        });

        tokio::select! {
            result = &mut server => {
                return match result {
                    Ok(served) => served.map_err(TtsError::from),
                    Err(e) => Err(TtsError::internal(format!("server task failed: {e}"))),
                };
            }
            _ = shutdown_signal() => {}
        }

        info!("Shutdown signal received, draining connections");
        let _ = shutdown_tx.send(true);

        tokio::select! {
            _ = tokio::time::sleep(shutdown_timeout) => {
                warn!("Shutdown timeout, forcing exit");
            }
            _ = &mut server => {
                info!("Server stopped gracefully");
            }
        }

        Ok(())
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {e}");
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
                warn!("Cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
