//! Server bootstrap

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::failsafe::DelayGate;
use crate::{Error, Result};

/// Cache test backend server
pub struct Server {
    /// Configuration
    config: Config,
    /// Admission gate shared by all timed routes
    gate: Arc<DelayGate>,
    /// Cancelled on shutdown; interrupts running delays
    shutdown: CancellationToken,
}

impl Server {
    /// Create a new server
    #[must_use]
    pub fn new(config: Config) -> Self {
        let shutdown = CancellationToken::new();
        let gate = Arc::new(DelayGate::with_shutdown(&config.delay, shutdown.clone()));

        Self {
            config,
            gate,
            shutdown,
        }
    }

    /// Admission gate used by this server
    pub fn gate(&self) -> Arc<DelayGate> {
        Arc::clone(&self.gate)
    }

    /// Application state for the router
    fn state(&self) -> AppState {
        #[cfg_attr(not(feature = "metrics"), allow(unused_mut))]
        let mut state = AppState::new(self.gate(), self.config.server.trust_forwarded_proto);

        #[cfg(feature = "metrics")]
        {
            match crate::metrics::install_prometheus() {
                Ok(handle) => state.metrics = Some(handle),
                Err(e) => warn!(error = %e, "Prometheus exporter disabled"),
            }
        }

        state
    }

    /// Bind and serve until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `signal` resolves
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_router(Arc::new(self.state()));
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            delay_capacity = self.gate.capacity(),
            max_delay = ?self.config.delay.max_delay,
            "Cache test backend listening"
        );

        let shutdown = self.shutdown.clone();
        let drain_timeout = self.config.server.shutdown_timeout;
        let graceful = async move {
            signal.await;
            info!("Shutdown signal received, interrupting running delays");
            shutdown.cancel();
        };

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .into_future();
        let shutdown = self.shutdown.clone();

        tokio::select! {
            result = server => result.map_err(|e| Error::Internal(e.to_string()))?,
            () = async {
                shutdown.cancelled().await;
                tokio::time::sleep(drain_timeout).await;
            } => {
                warn!(timeout = ?drain_timeout, "Connections still open after drain timeout, exiting");
            }
        }

        info!(
            rejected_delays = self.gate.rejected_total(),
            "Server stopped"
        );
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
