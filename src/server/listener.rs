//! Push gateway server
//!
//! Binds the TCP listener and serves the HTTP/WebSocket routes.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::registry::Registry;
use crate::server::config::ServerConfig;
use crate::server::routes::{build_router, AppState};
use crate::stats::Stats;

/// WebSocket push server
pub struct PushServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    stats: Arc<Stats>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl PushServer {
    /// Create a new server with the given configuration
    ///
    /// Starts the registry's pipeline workers, so it must be called inside a
    /// tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let stats = Arc::new(Stats::new());
        let registry = Arc::new(Registry::with_config(
            config.registry.clone(),
            Arc::clone(&stats),
        ));

        Self {
            config,
            registry,
            stats,
            connection_semaphore,
        }
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get a reference to the gateway counters
    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Build the router serving this gateway
    pub fn router(&self) -> Router {
        build_router(AppState {
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            connection: self.config.connection.clone(),
            welcome_message: self.config.welcome_message.clone().map(Bytes::from),
            echo_inbound: self.config.echo_inbound,
            connection_semaphore: self.connection_semaphore.clone(),
        })
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "Push server listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Push server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_run_until_on_ephemeral_port() {
        let config = ServerConfig::with_addr(SocketAddr::from(([127, 0, 0, 1], 0)));
        let server = PushServer::new(config);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let running = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!running.is_finished());

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .expect("server should stop after the shutdown signal")
            .unwrap();
        assert!(result.is_ok());
    }
}
