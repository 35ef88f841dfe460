//! Benchmark payloads
//!
//! A payload is either synthetic filler (`fileSizeMb` megabytes of `0x01`)
//! or the content of a local file (`fileName`). Both are held in memory so
//! the stream handed to the orchestrator only returns a short read at the
//! real end of the data, and so the upload can be verified afterwards.

use super::UploadError;
use bytes::Bytes;
use std::io::Cursor;
use std::path::PathBuf;

/// One megabyte, the unit of `fileSizeMb`
pub const ONE_MB: u64 = 1024 * 1024;

/// Byte used to fill synthetic payloads
pub const FILLER_BYTE: u8 = 1;

/// Where the payload comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    Synthetic { size_mb: u64 },
    File { path: PathBuf },
}

/// Payload bytes ready for upload
#[derive(Debug, Clone)]
pub struct Payload {
    source: PayloadSource,
    data: Bytes,
}

impl Payload {
    /// Materialize a payload
    pub async fn load(source: PayloadSource) -> Result<Self, UploadError> {
        let data = match &source {
            PayloadSource::Synthetic { size_mb } => {
                let len = size_mb
                    .checked_mul(ONE_MB)
                    .and_then(|len| usize::try_from(len).ok())
                    .ok_or_else(|| {
                        UploadError::Config(format!("payload of {} MB is too large", size_mb))
                    })?;
                Bytes::from(vec![FILLER_BYTE; len])
            }
            PayloadSource::File { path } => Bytes::from(tokio::fs::read(path).await?),
        };

        tracing::debug!(source = ?source, bytes = data.len(), "Loaded payload");
        Ok(Self { source, data })
    }

    /// Wrap bytes already in memory
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            source: PayloadSource::Synthetic {
                size_mb: data.len() as u64 / ONE_MB,
            },
            data,
        }
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fresh stream over the payload
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.data.clone())
    }
}
