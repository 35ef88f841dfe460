//! In-memory multipart backend
//!
//! Keeps sessions and assembled objects in process memory. Every call is
//! appended to a call log so tests can assert on the exact protocol
//! exchange, and single operations can be made to fail on demand.
//!
//! Completion is validated the way S3 validates it: the part list must be
//! non-empty and ascending, every token must match an uploaded part, and
//! every part but the last must meet the minimum part size.
//!
//! Assembled objects stay in memory until `delete_object` removes them. A
//! long-running server using a memory target holds a full copy of every
//! payload uploaded without `cleanup=true`.

use super::{BackendError, CompletedPart, MultipartBackend, ObjectStore, MAX_PARTS, MIN_PART_SIZE};
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// One call received by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Initiate {
        key: String,
    },
    UploadPart {
        session_id: String,
        part_number: u32,
        size: usize,
        is_final: bool,
    },
    Complete {
        session_id: String,
        parts: Vec<CompletedPart>,
    },
    Abort {
        session_id: String,
    },
}

#[derive(Debug)]
struct PendingUpload {
    key: String,
    parts: BTreeMap<u32, StoredPart>,
}

#[derive(Debug)]
struct StoredPart {
    data: Bytes,
    ack_token: String,
    is_final: bool,
}

/// Injected failures
#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    initiate: bool,
    part: Option<u32>,
    complete: bool,
    delete: bool,
    corrupt_reads: bool,
}

/// In-memory backend
#[derive(Debug)]
pub struct MemoryBackend {
    min_part_size: usize,
    sessions: DashMap<String, PendingUpload>,
    objects: DashMap<String, Bytes>,
    calls: Mutex<Vec<BackendCall>>,
    faults: Mutex<Faults>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            min_part_size: MIN_PART_SIZE,
            sessions: DashMap::new(),
            objects: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Override the minimum part size (useful for fast tests)
    pub fn with_min_part_size(mut self, min_part_size: usize) -> Self {
        self.min_part_size = min_part_size;
        self
    }

    /// Make `initiate_upload` fail
    pub fn fail_initiate(&self) {
        self.faults.lock().initiate = true;
    }

    /// Make `upload_part` fail for the given part number
    pub fn fail_part(&self, part_number: u32) {
        self.faults.lock().part = Some(part_number);
    }

    /// Make `complete_upload` fail
    pub fn fail_complete(&self) {
        self.faults.lock().complete = true;
    }

    /// Make `delete_object` fail
    pub fn fail_delete(&self) {
        self.faults.lock().delete = true;
    }

    /// Make `get_object` return content that differs from what was stored
    pub fn corrupt_reads(&self) {
        self.faults.lock().corrupt_reads = true;
    }

    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Ids of sessions that were neither completed nor aborted
    pub fn pending_sessions(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    /// Final flags of the parts uploaded to a pending session, by part number
    pub fn pending_part_flags(&self, session_id: &str) -> Option<Vec<(u32, bool)>> {
        self.sessions.get(session_id).map(|upload| {
            upload
                .parts
                .iter()
                .map(|(number, part)| (*number, part.is_final))
                .collect()
        })
    }

    /// Assembled object content
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.get(key).map(|o| o.value().clone())
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    fn injected(&self, what: &str) -> BackendError {
        BackendError::Request(format!("injected failure: {}", what))
    }
}

#[async_trait::async_trait]
impl MultipartBackend for MemoryBackend {
    fn min_part_size(&self) -> usize {
        self.min_part_size
    }

    async fn initiate_upload(&self, key: &str) -> Result<String, BackendError> {
        self.record(BackendCall::Initiate {
            key: key.to_string(),
        });
        if self.faults.lock().initiate {
            return Err(self.injected("initiate"));
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(
            session_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );

        tracing::debug!(key, session_id = %session_id, "Created in-memory multipart upload");
        Ok(session_id)
    }

    async fn upload_part(
        &self,
        session_id: &str,
        key: &str,
        part_number: u32,
        data: Bytes,
        is_final: bool,
    ) -> Result<String, BackendError> {
        self.record(BackendCall::UploadPart {
            session_id: session_id.to_string(),
            part_number,
            size: data.len(),
            is_final,
        });
        if self.faults.lock().part == Some(part_number) {
            return Err(self.injected("upload part"));
        }

        if part_number == 0 || part_number > MAX_PARTS {
            return Err(BackendError::InvalidPart {
                part_number,
                reason: format!("part number must be between 1 and {}", MAX_PARTS),
            });
        }

        let mut upload = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| BackendError::NoSuchUpload(session_id.to_string()))?;
        if upload.key != key {
            return Err(BackendError::NoSuchUpload(format!(
                "{} is not an upload of {}",
                session_id, key
            )));
        }

        let ack_token = format!("\"part-{}\"", uuid::Uuid::new_v4());
        upload.parts.insert(
            part_number,
            StoredPart {
                data,
                ack_token: ack_token.clone(),
                is_final,
            },
        );

        Ok(ack_token)
    }

    async fn complete_upload(
        &self,
        session_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> Result<String, BackendError> {
        self.record(BackendCall::Complete {
            session_id: session_id.to_string(),
            parts: parts.to_vec(),
        });
        if self.faults.lock().complete {
            return Err(self.injected("complete"));
        }

        let object = {
            let upload = self
                .sessions
                .get(session_id)
                .ok_or_else(|| BackendError::NoSuchUpload(session_id.to_string()))?;
            if upload.key != key {
                return Err(BackendError::NoSuchUpload(format!(
                    "{} is not an upload of {}",
                    session_id, key
                )));
            }
            if parts.is_empty() {
                return Err(BackendError::EmptyUpload(session_id.to_string()));
            }

            let mut object = BytesMut::new();
            let mut previous = 0;
            for (index, part) in parts.iter().enumerate() {
                if part.part_number <= previous {
                    return Err(BackendError::InvalidPart {
                        part_number: part.part_number,
                        reason: "parts must be listed in ascending order".into(),
                    });
                }
                previous = part.part_number;

                let stored =
                    upload
                        .parts
                        .get(&part.part_number)
                        .ok_or_else(|| BackendError::InvalidPart {
                            part_number: part.part_number,
                            reason: "part was never uploaded".into(),
                        })?;
                if stored.ack_token != part.ack_token {
                    return Err(BackendError::InvalidPart {
                        part_number: part.part_number,
                        reason: "acknowledgement token does not match".into(),
                    });
                }
                let is_last = index + 1 == parts.len();
                if !is_last && stored.data.len() < self.min_part_size {
                    return Err(BackendError::EntityTooSmall {
                        part_number: part.part_number,
                        size: stored.data.len(),
                        min: self.min_part_size,
                    });
                }
                object.extend_from_slice(&stored.data);
            }
            object.freeze()
        };

        self.sessions.remove(session_id);
        self.objects.insert(key.to_string(), object);
        Ok(format!("memory://{}", key))
    }

    async fn abort_upload(&self, session_id: &str, _key: &str) -> Result<(), BackendError> {
        self.record(BackendCall::Abort {
            session_id: session_id.to_string(),
        });
        self.sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NoSuchUpload(session_id.to_string()))
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryBackend {
    async fn get_object(&self, key: &str) -> Result<Bytes, BackendError> {
        let object = self
            .object(key)
            .ok_or_else(|| BackendError::NoSuchKey(key.to_string()))?;
        if self.faults.lock().corrupt_reads {
            let mut corrupted = BytesMut::from(&object[..]);
            corrupted.extend_from_slice(b"!");
            return Ok(corrupted.freeze());
        }
        Ok(object)
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        if self.faults.lock().delete {
            return Err(self.injected("delete"));
        }
        self.objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initiate_returns_session_id() {
        let backend = MemoryBackend::new();
        let session_id = backend.initiate_upload("key").await.unwrap();

        assert!(!session_id.is_empty());
        assert_eq!(backend.pending_sessions(), vec![session_id]);
    }

    #[tokio::test]
    async fn test_complete_assembles_parts_in_order() {
        let backend = MemoryBackend::new().with_min_part_size(4);
        let session_id = backend.initiate_upload("key").await.unwrap();

        let first = backend
            .upload_part(&session_id, "key", 1, Bytes::from_static(b"abcd"), false)
            .await
            .unwrap();
        let second = backend
            .upload_part(&session_id, "key", 2, Bytes::from_static(b"ef"), true)
            .await
            .unwrap();

        let parts = vec![
            CompletedPart {
                part_number: 1,
                ack_token: first,
            },
            CompletedPart {
                part_number: 2,
                ack_token: second,
            },
        ];
        let location = backend
            .complete_upload(&session_id, "key", &parts)
            .await
            .unwrap();

        assert_eq!(location, "memory://key");
        assert_eq!(backend.object("key").unwrap(), Bytes::from_static(b"abcdef"));
        assert!(backend.pending_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_complete_empty_fails() {
        let backend = MemoryBackend::new();
        let session_id = backend.initiate_upload("key").await.unwrap();

        let result = backend.complete_upload(&session_id, "key", &[]).await;
        assert!(matches!(result, Err(BackendError::EmptyUpload(_))));
    }

    #[tokio::test]
    async fn test_complete_rejects_small_middle_part() {
        let backend = MemoryBackend::new().with_min_part_size(4);
        let session_id = backend.initiate_upload("key").await.unwrap();

        let first = backend
            .upload_part(&session_id, "key", 1, Bytes::from_static(b"ab"), true)
            .await
            .unwrap();
        let second = backend
            .upload_part(&session_id, "key", 2, Bytes::from_static(b"cd"), true)
            .await
            .unwrap();

        let parts = vec![
            CompletedPart {
                part_number: 1,
                ack_token: first,
            },
            CompletedPart {
                part_number: 2,
                ack_token: second,
            },
        ];
        let result = backend.complete_upload(&session_id, "key", &parts).await;
        assert!(matches!(
            result,
            Err(BackendError::EntityTooSmall { part_number: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_complete_rejects_unknown_token() {
        let backend = MemoryBackend::new().with_min_part_size(1);
        let session_id = backend.initiate_upload("key").await.unwrap();
        backend
            .upload_part(&session_id, "key", 1, Bytes::from_static(b"ab"), true)
            .await
            .unwrap();

        let parts = vec![CompletedPart {
            part_number: 1,
            ack_token: "\"bogus\"".into(),
        }];
        let result = backend.complete_upload(&session_id, "key", &parts).await;
        assert!(matches!(result, Err(BackendError::InvalidPart { .. })));
    }

    #[tokio::test]
    async fn test_abort_removes_session() {
        let backend = MemoryBackend::new();
        let session_id = backend.initiate_upload("key").await.unwrap();

        backend.abort_upload(&session_id, "key").await.unwrap();
        assert!(backend.pending_sessions().is_empty());

        let again = backend.abort_upload(&session_id, "key").await;
        assert!(matches!(again, Err(BackendError::NoSuchUpload(_))));
    }

    #[tokio::test]
    async fn test_injected_part_failure() {
        let backend = MemoryBackend::new();
        backend.fail_part(1);
        let session_id = backend.initiate_upload("key").await.unwrap();

        let result = backend
            .upload_part(&session_id, "key", 1, Bytes::from_static(b"x"), true)
            .await;
        assert!(result.is_err());
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let backend = MemoryBackend::new();
        let result = backend.get_object("missing").await;
        assert!(matches!(result, Err(BackendError::NoSuchKey(_))));
    }

    #[tokio::test]
    async fn test_objects_retained_until_deleted() {
        let backend = MemoryBackend::new().with_min_part_size(1);
        for key in ["a", "b"] {
            let session_id = backend.initiate_upload(key).await.unwrap();
            let token = backend
                .upload_part(&session_id, key, 1, Bytes::from_static(b"xy"), true)
                .await
                .unwrap();
            let parts = vec![CompletedPart {
                part_number: 1,
                ack_token: token,
            }];
            backend
                .complete_upload(&session_id, key, &parts)
                .await
                .unwrap();
        }
        assert_eq!(backend.object_count(), 2);

        backend.delete_object("a").await.unwrap();
        assert_eq!(backend.object_count(), 1);
        assert!(backend.object("a").is_none());
    }

    #[tokio::test]
    async fn test_injected_read_and_delete_faults() {
        let backend = MemoryBackend::new().with_min_part_size(1);
        backend.objects.insert("key".into(), Bytes::from_static(b"data"));
        backend.corrupt_reads();
        backend.fail_delete();

        assert_ne!(backend.get_object("key").await.unwrap(), Bytes::from_static(b"data"));
        assert!(matches!(
            backend.delete_object("key").await,
            Err(BackendError::Request(_))
        ));
        assert_eq!(backend.object_count(), 1);
    }
}
