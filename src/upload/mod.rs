//! Upload module
//!
//! Chunked multipart upload orchestration and the service context that runs
//! benchmark uploads against a configured target.

use crate::backend::BackendError;
use std::time::Duration;
use thiserror::Error;

pub mod keys;
pub mod orchestrator;
pub mod payload;
pub mod service;
pub mod session;

pub use keys::KeySequence;
pub use orchestrator::ChunkedUploadOrchestrator;
pub use payload::{Payload, PayloadSource};
pub use service::{UploadOptions, UploadService};
pub use session::{PartRecord, SessionState, UploadSession};

/// Upload errors
///
/// Errors raised after the session was opened carry the failed session so
/// the caller can decide whether to abandon it.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid upload configuration: {0}")]
    Config(String),

    #[error("IO error: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        session: Option<Box<UploadSession>>,
    },

    #[error("Backend error: {source}")]
    Backend {
        #[source]
        source: BackendError,
        session: Option<Box<UploadSession>>,
    },

    #[error("Uploaded object {key} does not match the source payload")]
    Corrupted { key: String },
}

impl UploadError {
    /// The session left behind by the failure, if one was opened
    pub fn session(&self) -> Option<&UploadSession> {
        match self {
            UploadError::Io { session, .. } | UploadError::Backend { session, .. } => {
                session.as_deref()
            }
            _ => None,
        }
    }

    /// Mutable access to the failed session, used by `abandon`
    pub fn session_mut(&mut self) -> Option<&mut UploadSession> {
        match self {
            UploadError::Io { session, .. } | UploadError::Backend { session, .. } => {
                session.as_deref_mut()
            }
            _ => None,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Config(_) => "config",
            UploadError::Io { .. } => "io",
            UploadError::Backend { .. } => "backend",
            UploadError::Corrupted { .. } => "corrupted",
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(source: std::io::Error) -> Self {
        UploadError::Io {
            source,
            session: None,
        }
    }
}

/// Upload outcome
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub key: String,
    pub location: String,
    /// Number of parts sent, equal to the last part number
    pub part_count: u32,
    pub bytes_uploaded: u64,
    /// Time since the session was initiated
    pub elapsed: Duration,
    pub session: UploadSession,
}

impl UploadOutcome {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        format!("Sent {} parts in {:.3?}", self.part_count, self.elapsed)
    }
}
