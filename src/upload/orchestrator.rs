//! Chunked multipart upload orchestration
//!
//! Splits a byte stream into fixed-size parts and drives one multipart
//! session on the backend:
//!
//! 1. `initiate_upload`
//! 2. one `read` of up to `chunk_size` bytes per iteration; each non-empty
//!    read becomes a part, and a read shorter than `chunk_size` is the final
//!    part
//! 3. `complete_upload` with every acknowledgement token, in order
//!
//! A short read ends the upload even when the stream is not exhausted, and
//! a stream whose length is an exact multiple of `chunk_size` never sends a
//! part marked final: the loop stops on the following zero-byte read.
//!
//! The orchestrator never retries and never aborts on its own. A failed run
//! hands the pending session back through the error; [`ChunkedUploadOrchestrator::abandon`]
//! releases it.

use super::session::{PartRecord, SessionState, UploadSession};
use super::{UploadError, UploadOutcome};
use crate::backend::MultipartBackend;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Sequential chunked upload driver for one backend
pub struct ChunkedUploadOrchestrator<B: ?Sized> {
    backend: Arc<B>,
    chunk_size: usize,
}

impl<B: MultipartBackend + ?Sized> ChunkedUploadOrchestrator<B> {
    pub fn new(backend: Arc<B>, chunk_size: usize) -> Self {
        Self {
            backend,
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn check_chunk_size(&self) -> Result<(), UploadError> {
        let min = self.backend.min_part_size();
        if self.chunk_size == 0 || self.chunk_size < min {
            return Err(UploadError::Config(format!(
                "chunk size {} is below the backend minimum part size {}",
                self.chunk_size, min
            )));
        }
        Ok(())
    }

    /// Upload `stream` to `key`
    #[tracing::instrument(
        name = "upload.orchestrate",
        skip(self, stream),
        fields(
            upload.key = %key,
            upload.chunk_size = self.chunk_size,
            upload.session_id = tracing::field::Empty,
            upload.parts = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload<R>(&self, stream: R, key: &str) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.check_chunk_size()?;
        let mut stream = stream;

        let started = Instant::now();
        let session_id = self
            .backend
            .initiate_upload(key)
            .await
            .map_err(|source| UploadError::Backend {
                source,
                session: None,
            })?;
        let span = tracing::Span::current();
        span.record("upload.session_id", session_id.as_str());

        let mut session = UploadSession::new(key, session_id);
        info!(key, session_id = %session.session_id, "Starting upload");

        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let bytes_read = match stream.read(&mut buffer).await {
                Ok(n) => n,
                Err(source) => {
                    session.state = SessionState::Failed;
                    return Err(UploadError::Io {
                        source,
                        session: Some(Box::new(session)),
                    });
                }
            };
            if bytes_read == 0 {
                break;
            }

            let part_number = session.next_part_number();
            let is_final = bytes_read < self.chunk_size;
            debug!(part_number, bytes = bytes_read, is_final, "Uploading part");

            let data = Bytes::copy_from_slice(&buffer[..bytes_read]);
            let ack_token = match self
                .backend
                .upload_part(&session.session_id, key, part_number, data, is_final)
                .await
            {
                Ok(token) => token,
                Err(source) => {
                    session.state = SessionState::Failed;
                    return Err(UploadError::Backend {
                        source,
                        session: Some(Box::new(session)),
                    });
                }
            };

            session.record_part(PartRecord {
                part_number,
                byte_length: bytes_read,
                is_final,
                ack_token,
            });

            if is_final {
                break;
            }
        }

        let parts = session.completed_parts();
        let location = match self
            .backend
            .complete_upload(&session.session_id, key, &parts)
            .await
        {
            Ok(location) => location,
            Err(source) => {
                session.state = SessionState::Failed;
                return Err(UploadError::Backend {
                    source,
                    session: Some(Box::new(session)),
                });
            }
        };
        session.state = SessionState::Completed;

        let elapsed = started.elapsed();
        span.record("upload.parts", session.part_count());
        info!(
            key,
            location = %location,
            parts = session.part_count(),
            bytes = session.bytes_uploaded(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Uploaded"
        );

        Ok(UploadOutcome {
            key: key.to_string(),
            location,
            part_count: session.part_count(),
            bytes_uploaded: session.bytes_uploaded(),
            elapsed,
            session,
        })
    }

    /// Abort a session left pending by a failed upload
    #[tracing::instrument(
        name = "upload.abandon",
        skip(self, session),
        fields(upload.key = %session.object_key, upload.session_id = %session.session_id),
        err
    )]
    pub async fn abandon(&self, session: &mut UploadSession) -> Result<(), UploadError> {
        self.backend
            .abort_upload(&session.session_id, &session.object_key)
            .await
            .map_err(|source| UploadError::Backend {
                source,
                session: None,
            })?;
        session.state = SessionState::Abandoned;
        info!(key = %session.object_key, "Abandoned upload");
        Ok(())
    }
}
