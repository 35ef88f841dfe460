//! HTTP server module
//!
//! Binds the configured address, builds one [`UploadService`] per target and
//! serves the benchmark routes over HTTP/1.1.
//!
//! # Example
//!
//! ```no_run
//! use upload_bench::{config::Config, server::Server};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = Server::new(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

mod handler;

use crate::backend;
use crate::config::Config;
use crate::upload::{KeySequence, UploadService};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// State shared by every connection
pub(crate) struct AppState {
    pub services: HashMap<String, UploadService>,
    pub metrics_enabled: bool,
    pub max_payload_mb: u64,
}

/// HTTP Server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Create a new server instance
    ///
    /// Connects every configured backend and binds the listener. Port 0
    /// lets the OS pick a port; see [`Server::local_addr`].
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        // One counter for the whole process so keys never repeat across targets
        let keys = Arc::new(KeySequence::new());
        let mut services = HashMap::new();
        for target in &config.targets {
            let backend = backend::from_config(&target.backend).await.map_err(|e| {
                ServerError::RuntimeError(format!(
                    "Failed to create backend for target '{}': {}",
                    target.name, e
                ))
            })?;
            info!(target_name = %target.name, "Upload target ready");
            services.insert(
                target.name.clone(),
                UploadService::new(&target.name, backend, Arc::clone(&keys), &config.upload),
            );
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(AppState {
                services,
                metrics_enabled: config.metrics.enabled,
                max_payload_mb: config.upload.max_payload_mb,
            }),
            listener,
            local_addr,
        })
    }

    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve connections until the process is stopped
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve connections until `shutdown` resolves
    ///
    /// Uploads already in flight keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting server on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handler::handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}
