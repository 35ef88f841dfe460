//! Storage backends
//!
//! The upload orchestrator is written against the three-phase multipart
//! protocol (initiate, upload part, complete) plus an explicit abort. Any
//! storage client implements [`MultipartBackend`] to become an upload target.
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | S3 (and S3-compatible stores) | [`s3`] | Real benchmarks |
//! | Local filesystem | [`filesystem`] | Disk-bound runs without credentials |
//! | In-memory | [`memory`] | Tests, dry runs |

use crate::config::BackendConfig;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

pub mod filesystem;
pub mod memory;
pub mod s3;

pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;
pub use s3::S3Backend;

/// Minimum part size (5MB) - S3 requirement for every part except the last
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum parts allowed in one upload
pub const MAX_PARTS: u32 = 10000;

/// Backend errors
///
/// The orchestrator never inspects these; transient-vs-permanent
/// classification belongs to the backend client.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Request error: {0}")]
    Request(String),

    #[error("No such upload: {0}")]
    NoSuchUpload(String),

    #[error("Invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },

    #[error("Upload {0} cannot be completed without parts")]
    EmptyUpload(String),

    #[error("Part {part_number} is {size} bytes, smaller than the minimum of {min} bytes")]
    EntityTooSmall {
        part_number: u32,
        size: usize,
        min: usize,
    },

    #[error("No such key: {0}")]
    NoSuchKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A part as referenced by the completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub ack_token: String,
}

/// Multipart upload protocol
#[async_trait::async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Smallest size accepted for any part but the last one
    fn min_part_size(&self) -> usize {
        MIN_PART_SIZE
    }

    /// Open a multipart session for `key`, returning its session id
    async fn initiate_upload(&self, key: &str) -> Result<String, BackendError>;

    /// Upload one part, returning the acknowledgement token needed to complete
    async fn upload_part(
        &self,
        session_id: &str,
        key: &str,
        part_number: u32,
        data: Bytes,
        is_final: bool,
    ) -> Result<String, BackendError>;

    /// Assemble the listed parts into the object, returning its location
    async fn complete_upload(
        &self,
        session_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> Result<String, BackendError>;

    /// Discard a session and every part uploaded to it
    async fn abort_upload(&self, session_id: &str, key: &str) -> Result<(), BackendError>;
}

/// Read-back access used to verify and clean up after a benchmark upload
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<Bytes, BackendError>;

    async fn delete_object(&self, key: &str) -> Result<(), BackendError>;
}

/// A complete upload target
pub trait StorageBackend: MultipartBackend + ObjectStore {}

impl<T: MultipartBackend + ObjectStore> StorageBackend for T {}

/// Build the backend described by a target's configuration
pub async fn from_config(config: &BackendConfig) -> Result<Arc<dyn StorageBackend>, BackendError> {
    let backend: Arc<dyn StorageBackend> = match config {
        BackendConfig::S3(s3) => Arc::new(S3Backend::connect(s3).await?),
        BackendConfig::Filesystem(fs) => {
            Arc::new(FilesystemBackend::new(&fs.root).with_min_part_size(fs.min_part_size))
        }
        BackendConfig::Memory(mem) => {
            Arc::new(MemoryBackend::new().with_min_part_size(mem.min_part_size))
        }
    };
    Ok(backend)
}
