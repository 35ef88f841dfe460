//! Upload service
//!
//! Enclosing context for one upload target: derives unique object keys from
//! the shared [`KeySequence`], runs the orchestrator, and applies the caller
//! policies the orchestrator leaves open (abort on failure, read-back
//! verification, cleanup).

use super::keys::KeySequence;
use super::orchestrator::ChunkedUploadOrchestrator;
use super::payload::Payload;
use super::{UploadError, UploadOutcome};
use crate::backend::StorageBackend;
use crate::config::UploadConfig;
use crate::metrics;
use std::sync::Arc;
use tracing::{error, warn};

/// Per-request options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Read the object back and compare it with the payload
    pub verify: bool,
    /// Delete the object once the upload (and verification) is done
    pub cleanup: bool,
}

/// Benchmark uploads against one target
pub struct UploadService {
    target: String,
    backend: Arc<dyn StorageBackend>,
    orchestrator: ChunkedUploadOrchestrator<dyn StorageBackend>,
    keys: Arc<KeySequence>,
    key_prefix: String,
    abort_on_failure: bool,
}

impl UploadService {
    pub fn new(
        target: &str,
        backend: Arc<dyn StorageBackend>,
        keys: Arc<KeySequence>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            target: target.to_string(),
            orchestrator: ChunkedUploadOrchestrator::new(Arc::clone(&backend), config.part_size),
            backend,
            keys,
            key_prefix: config.key_prefix.clone(),
            abort_on_failure: config.abort_on_failure,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Next unique object key
    pub fn derive_key(&self) -> String {
        self.keys.derive(&self.key_prefix)
    }

    /// Upload a payload under a freshly derived key
    pub async fn upload(
        &self,
        payload: &Payload,
        options: UploadOptions,
    ) -> Result<UploadOutcome, UploadError> {
        let result = self.run(payload, options).await;
        match &result {
            Ok(outcome) => metrics::record_upload_success(
                &self.target,
                outcome.bytes_uploaded,
                outcome.part_count,
                outcome.elapsed.as_secs_f64(),
            ),
            Err(e) => metrics::record_upload_failure(&self.target, e.kind()),
        }
        result
    }

    async fn run(
        &self,
        payload: &Payload,
        options: UploadOptions,
    ) -> Result<UploadOutcome, UploadError> {
        let key = self.derive_key();

        let outcome = match self.orchestrator.upload(payload.reader(), &key).await {
            Ok(outcome) => outcome,
            Err(mut err) => {
                error!(target_name = %self.target, key = %key, error = %err, "Upload failed");
                if self.abort_on_failure {
                    if let Some(session) = err.session_mut() {
                        if let Err(abort_err) = self.orchestrator.abandon(session).await {
                            warn!(key = %key, error = %abort_err, "Failed to abandon upload");
                        }
                    }
                }
                return Err(err);
            }
        };

        let verified = if options.verify {
            self.verify(&key, payload).await
        } else {
            Ok(())
        };

        if options.cleanup {
            if let Err(source) = self.backend.delete_object(&key).await {
                if verified.is_err() {
                    // The verification failure is the result; the leftover object is only logged
                    warn!(key = %key, error = %source, "Failed to clean up corrupted object");
                } else {
                    return Err(UploadError::Backend {
                        source,
                        session: None,
                    });
                }
            }
        }

        verified.map(|()| outcome)
    }

    async fn verify(&self, key: &str, payload: &Payload) -> Result<(), UploadError> {
        let stored = self
            .backend
            .get_object(key)
            .await
            .map_err(|source| UploadError::Backend {
                source,
                session: None,
            })?;

        if stored != *payload.data() {
            warn!(
                key,
                expected = payload.len(),
                actual = stored.len(),
                "Uploaded content corrupted"
            );
            return Err(UploadError::Corrupted {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn small_config() -> UploadConfig {
        UploadConfig {
            part_size: 8,
            ..UploadConfig::default()
        }
    }

    #[tokio::test]
    async fn test_derived_keys_are_distinct() {
        let backend = Arc::new(MemoryBackend::new().with_min_part_size(8));
        let service = UploadService::new(
            "memory",
            backend,
            Arc::new(KeySequence::new()),
            &small_config(),
        );

        assert_eq!(service.derive_key(), "storage-performance-test-file1");
        assert_eq!(service.derive_key(), "storage-performance-test-file2");
    }

    #[tokio::test]
    async fn test_cleanup_removes_object() {
        let backend = Arc::new(MemoryBackend::new().with_min_part_size(8));
        let service = UploadService::new(
            "memory",
            backend.clone(),
            Arc::new(KeySequence::new()),
            &small_config(),
        );

        let payload = Payload::from_bytes(&b"0123456789abcdef0123"[..]);
        let options = UploadOptions {
            verify: true,
            cleanup: true,
        };
        let outcome = service.upload(&payload, options).await.unwrap();

        assert_eq!(outcome.part_count, 3);
        assert_eq!(backend.object_count(), 0);
    }
}
