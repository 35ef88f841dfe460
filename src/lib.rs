//! Upload Bench Library
//!
//! Storage upload benchmark: streams a payload to a storage backend as a
//! chunked multipart upload and reports how long it took.
//!
//! # Features
//!
//! - **Chunked uploads**: fixed-size parts, the last one flagged as final
//! - **Pluggable backends**: S3 (and compatibles), local filesystem, in-memory
//! - **HTTP trigger**: `GET /upload/{target}?fileSizeMb=N` or `?fileName=PATH`
//! - **Prometheus metrics**: `GET /metrics`
//!
//! # Example
//!
//! ```no_run
//! use upload_bench::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod router;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
