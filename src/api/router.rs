//! API router configuration and server lifecycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{any, delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::handlers::{
    api_info, broadcast, delete_session, health, list_sessions, AppState, DEFAULT_KEEP_ALIVE,
};
use super::websocket::ws_handler;
use crate::publisher::DEFAULT_PUBLISH_INTERVAL;
use crate::session::{spawn_sweeper, DEFAULT_SESSION_TIMEOUT, DEFAULT_SWEEP_INTERVAL};

/// Create the API router with all routes configured.
pub fn create_router() -> Router {
    create_router_with_state(AppState::new())
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/", get(api_info))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", delete(delete_session))
        .route("/broadcast", post(broadcast));

    Router::new()
        .route("/health", get(health))
        .route("/ws", any(ws_handler))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Default lifetime of a session.
    pub session_timeout: Duration,
    /// Period of the expiration sweep.
    pub sweep_interval: Duration,
    /// Period between price updates on each session.
    pub publish_interval: Duration,
    /// Period between keep-alive pings; `None` disables them.
    pub keep_alive: Option<Duration>,
    /// Wait for background tasks and close sessions on shutdown.
    pub graceful_shutdown: bool,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }

    pub fn with_keep_alive(mut self, period: Option<Duration>) -> Self {
        self.keep_alive = period;
        self
    }

    pub fn without_graceful_shutdown(mut self) -> Self {
        self.graceful_shutdown = false;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fresh application state built from this configuration.
    pub fn app_state(&self) -> AppState {
        AppState::with_settings(self.session_timeout, self.publish_interval)
            .with_keep_alive(self.keep_alive)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            keep_alive: Some(DEFAULT_KEEP_ALIVE),
            graceful_shutdown: true,
        }
    }
}

/// Start the server and run until Ctrl+C or SIGTERM.
pub async fn serve(config: ServerConfig) -> crate::Result<()> {
    let state = config.app_state();
    serve_with_state(config, state).await
}

/// Start the server with custom state and run until Ctrl+C or SIGTERM.
pub async fn serve_with_state(config: ServerConfig, state: AppState) -> crate::Result<()> {
    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Starting price-stream server on {}", addr);

    run(listener, &config, state, shutdown_signal()).await
}

/// Serve on an already-bound listener until `signal` resolves.
///
/// Starts the expiration sweeper, and on shutdown notifies every publisher,
/// waits for the connection tasks and the sweeper, then closes whatever
/// sessions remain.
pub async fn run<F>(
    listener: TcpListener,
    config: &ServerConfig,
    state: AppState,
    signal: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let sweeper = spawn_sweeper(
        Arc::clone(&state.registry),
        config.sweep_interval,
        state.shutdown_receiver(),
    );

    let router = create_router_with_state(state.clone());
    let notify = state.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            notify.trigger_shutdown();
        })
        .await;

    // Also reached when serving failed without a signal.
    state.trigger_shutdown();

    if config.graceful_shutdown {
        let drained = state.drain_connections().await;
        info!(connections = drained, "connection tasks finished");

        if let Err(e) = sweeper.await {
            warn!(error = %e, "sweeper task ended abnormally");
        }
        state.registry.close_all().await;
    } else {
        state.abort_connections();
        sweeper.abort();
    }

    info!("price-stream server stopped");
    served.map_err(crate::error::PriceStreamError::Io)
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.session_timeout, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.publish_interval, Duration::from_secs(2));
        assert_eq!(config.keep_alive, Some(Duration::from_secs(120)));
        assert!(config.graceful_shutdown);
    }

    #[test]
    fn test_server_config_builders() {
        let config = ServerConfig::new("0.0.0.0", 8080)
            .with_session_timeout(Duration::from_secs(5))
            .with_sweep_interval(Duration::from_secs(1))
            .with_publish_interval(Duration::from_millis(250))
            .with_keep_alive(None)
            .without_graceful_shutdown();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.session_timeout, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.publish_interval, Duration::from_millis(250));
        assert!(!config.graceful_shutdown);

        let state = config.app_state();
        assert_eq!(state.registry.default_timeout(), Duration::from_secs(5));
        assert_eq!(state.publisher.interval(), Duration::from_millis(250));
        assert_eq!(state.keep_alive(), None);
    }

    #[test]
    fn test_router_creation() {
        let _router = create_router();
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig::default();
        let state = config.app_state();

        run(listener, &config, state.clone(), async {}).await.unwrap();
        assert!(state.is_shutting_down());
    }

    #[tokio::test]
    async fn test_run_waits_for_connection_tasks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig::default();
        let state = config.app_state();

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let mut shutdown = state.shutdown_receiver();
        state.track(async move {
            let _ = shutdown.wait_for(|stopping| *stopping).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        run(listener, &config, state.clone(), async {}).await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(state.tracked_connections(), 0);
    }

    #[tokio::test]
    async fn test_run_aborts_connection_tasks_without_graceful_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig::default().without_graceful_shutdown();
        let state = config.app_state();

        state.track(std::future::pending::<()>());
        tokio::time::timeout(
            Duration::from_secs(5),
            run(listener, &config, state.clone(), async {}),
        )
        .await
        .expect("run hung on a pending connection task")
        .unwrap();
    }
}
