use log::{error, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::{ErrorReporter, JsonErrorReporter, ServerError};
use crate::limiter::RateLimiter;
use crate::middleware::Pipeline;
use crate::server::routes::{self, AppState};
use crate::utils::network::TrustedProxies;

/// A bound, not yet serving, API server.
pub struct Server {
    config: AppConfig,
    listener: TcpListener,
    limiter: RateLimiter,
    pipeline: Pipeline,
}

impl Server {
    /// Binds the listener and builds the limiter and middleware pipeline.
    pub async fn bind(config: AppConfig) -> Result<Self, ServerError> {
        Self::bind_with_routes(config, routes::routes).await
    }

    /// Like [`Server::bind`], serving the router built by `endpoint` behind
    /// the usual middleware instead of the API routes.
    pub async fn bind_with_routes<F>(config: AppConfig, endpoint: F) -> Result<Self, ServerError>
    where
        F: FnOnce(AppState) -> Router,
    {
        let addr = config.server.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server bound to {}", listener.local_addr()?);

        let trusted = TrustedProxies::from_config(&config.server.trusted_proxies)?;
        let limiter = RateLimiter::new(&config.limiter);
        let reporter: Arc<dyn ErrorReporter> = Arc::new(JsonErrorReporter);

        let state = AppState {
            env: config.server.env.clone(),
            version: routes::VERSION,
            reporter: Arc::clone(&reporter),
        };
        let pipeline = routes::wrap(endpoint(state), reporter, Arc::new(limiter.clone()), trusted);

        Ok(Self {
            config,
            listener,
            limiter,
            pipeline,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests for
    /// at most the configured shutdown timeout and stops limiter maintenance.
    ///
    /// Once the timeout passes this returns without waiting further. Requests
    /// still running at that point are not cancelled; their connection tasks
    /// live on until they finish or the runtime shuts down.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        let drain_timeout = self.config.server.shutdown_timeout();

        let maintenance_cancel = CancellationToken::new();
        let maintenance = self
            .limiter
            .maintenance()
            .map(|scheduler| scheduler.start(maintenance_cancel.clone()));

        let stop = CancellationToken::new();
        let signal_watch = {
            let stop = stop.clone();
            tokio::spawn(async move {
                shutdown.await;
                stop.cancel();
            })
        };

        info!(
            "Starting server on {} (env {}, rate limiting {})",
            addr,
            self.config.server.env,
            if self.config.limiter.enabled {
                "on"
            } else {
                "off"
            }
        );
        info!("Middleware order: {}", self.pipeline.names().join(" -> "));

        let app = Router::new().fallback_service(self.pipeline);
        let serve = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(stop.clone().cancelled_owned());
        let mut serving = tokio::spawn(async move { serve.await });

        let outcome = tokio::select! {
            joined = &mut serving => match joined {
                Ok(result) => result.map_err(ServerError::from),
                Err(e) => Err(ServerError::Serve(io::Error::other(e.to_string()))),
            },
            _ = drain_deadline(&stop, drain_timeout) => {
                warn!(
                    "In-flight requests did not finish within {:?}, no longer waiting for them",
                    drain_timeout
                );
                serving.abort();
                Ok(())
            }
        };

        if let Err(e) = &outcome {
            error!("Server stopped with error: {}", e);
        }

        signal_watch.abort();
        maintenance_cancel.cancel();
        if let Some(maintenance) = maintenance {
            maintenance.shutdown().await;
        }

        info!("Stopped server on {}", addr);
        outcome
    }
}

/// Resolves `timeout` after shutdown has begun.
async fn drain_deadline(stop: &CancellationToken, timeout: Duration) {
    stop.cancelled().await;
    tokio::time::sleep(timeout).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Shutting down server (signal SIGINT)"),
        _ = terminate => info!("Shutting down server (signal SIGTERM)"),
    }
}
