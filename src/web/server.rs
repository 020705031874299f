//! Web server for coderelay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::{Config, RateLimitConfig, WebConfig};
use crate::relay::ExpirySweeper;
use crate::{RelayError, Result};

use super::handlers::AppState;
use super::router::{create_health_router, create_router, create_swagger_router};

/// Web server for the relay API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Web configuration.
    web_config: WebConfig,
    /// Limiter eviction settings.
    rate_limit: RateLimitConfig,
    /// Background expiry sweeper.
    sweeper: Arc<ExpirySweeper>,
}

impl WebServer {
    /// Create a new web server.
    ///
    /// Creates the storage directory if needed.
    pub fn new(config: &Config) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid server address: {e}")))?;

        let app_state = Arc::new(AppState::from_config(config)?);
        let sweeper = Arc::new(ExpirySweeper::new(
            Arc::clone(&app_state.store),
            app_state.storage.clone(),
            Duration::from_secs(config.sweeper.interval_secs),
        ));

        tracing::info!(
            "File storage initialized at: {}",
            app_state.storage.base_path().display()
        );

        Ok(Self {
            addr,
            app_state,
            web_config: config.web.clone(),
            rate_limit: config.rate_limit.clone(),
            sweeper,
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared application state.
    pub fn app_state(&self) -> &Arc<AppState> {
        &self.app_state
    }

    fn build_router(&self) -> Router {
        create_router(Arc::clone(&self.app_state), &self.web_config)
            .merge(create_health_router())
            .merge(create_swagger_router())
    }

    fn start_background_tasks(&self) {
        Arc::clone(&self.sweeper).start();
        Arc::clone(&self.app_state.limiters).start_cleanup_task(self.rate_limit.idle_eviction());
    }

    /// Run the web server until it fails.
    pub async fn run(self) -> Result<()> {
        let router = self.build_router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        // Background tasks start only after a successful bind
        self.start_background_tasks();

        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr> {
        let router = self.build_router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        self.start_background_tasks();

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
