//! Local filesystem backend
//!
//! Emulates the multipart protocol on a directory tree:
//!
//! ```text
//! <root>/
//!   .multipart/<session_id>/key           object key of the session
//!   .multipart/<session_id>/part-00001    uploaded parts
//!   <key>                                 assembled objects
//! ```
//!
//! Acknowledgement tokens are the hex SHA256 of the part content, checked
//! again when the upload is completed.

use super::{BackendError, CompletedPart, MultipartBackend, ObjectStore, MAX_PARTS, MIN_PART_SIZE};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const SESSIONS_DIR: &str = ".multipart";
const KEY_FILE: &str = "key";

/// Filesystem backend rooted at a directory
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
    min_part_size: usize,
}

impl FilesystemBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            min_part_size: MIN_PART_SIZE,
        }
    }

    pub fn with_min_part_size(mut self, min_part_size: usize) -> Self {
        self.min_part_size = min_part_size;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf, BackendError> {
        // Session ids are uuids we issued; anything else cannot name a session.
        if uuid::Uuid::parse_str(session_id).is_err() {
            return Err(BackendError::NoSuchUpload(session_id.to_string()));
        }
        Ok(self.root.join(SESSIONS_DIR).join(session_id))
    }

    fn part_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{:05}", part_number))
    }

    /// Map an object key to a path below the root, refusing escapes
    fn object_path(&self, key: &str) -> Result<PathBuf, BackendError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            && relative
                .components()
                .next()
                .map_or(false, |first| first.as_os_str() != SESSIONS_DIR);
        if !valid {
            return Err(BackendError::Request(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    /// Open session directory after checking it belongs to `key`
    async fn open_session(&self, session_id: &str, key: &str) -> Result<PathBuf, BackendError> {
        let dir = self.session_dir(session_id)?;
        let stored_key = match fs::read_to_string(dir.join(KEY_FILE)).await {
            Ok(k) => k,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::NoSuchUpload(session_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if stored_key != key {
            return Err(BackendError::NoSuchUpload(format!(
                "{} is not an upload of {}",
                session_id, key
            )));
        }
        Ok(dir)
    }

    fn content_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}

#[async_trait::async_trait]
impl MultipartBackend for FilesystemBackend {
    fn min_part_size(&self) -> usize {
        self.min_part_size
    }

    #[tracing::instrument(name = "fs.initiate_upload", skip(self), fields(fs.root = %self.root.display()), err)]
    async fn initiate_upload(&self, key: &str) -> Result<String, BackendError> {
        self.object_path(key)?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let dir = self.session_dir(&session_id)?;
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(KEY_FILE), key).await?;

        Ok(session_id)
    }

    #[tracing::instrument(
        name = "fs.upload_part",
        skip(self, data),
        fields(upload.bytes = data.len()),
        err
    )]
    async fn upload_part(
        &self,
        session_id: &str,
        key: &str,
        part_number: u32,
        data: Bytes,
        is_final: bool,
    ) -> Result<String, BackendError> {
        if part_number == 0 || part_number > MAX_PARTS {
            return Err(BackendError::InvalidPart {
                part_number,
                reason: format!("part number must be between 1 and {}", MAX_PARTS),
            });
        }
        let dir = self.open_session(session_id, key).await?;

        fs::write(Self::part_path(&dir, part_number), &data).await?;
        Ok(Self::content_hash(&data))
    }

    #[tracing::instrument(
        name = "fs.complete_upload",
        skip(self, parts),
        fields(parts_count = parts.len()),
        err
    )]
    async fn complete_upload(
        &self,
        session_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> Result<String, BackendError> {
        let dir = self.open_session(session_id, key).await?;
        if parts.is_empty() {
            return Err(BackendError::EmptyUpload(session_id.to_string()));
        }

        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Assemble next to the target so the final rename stays on one filesystem.
        let staging = dir.join("assembled");
        let mut out = fs::File::create(&staging).await?;

        let mut previous = 0;
        for (index, part) in parts.iter().enumerate() {
            if part.part_number <= previous {
                return Err(BackendError::InvalidPart {
                    part_number: part.part_number,
                    reason: "parts must be listed in ascending order".into(),
                });
            }
            previous = part.part_number;

            let data = match fs::read(Self::part_path(&dir, part.part_number)).await {
                Ok(d) => d,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(BackendError::InvalidPart {
                        part_number: part.part_number,
                        reason: "part was never uploaded".into(),
                    })
                }
                Err(e) => return Err(e.into()),
            };
            if Self::content_hash(&data) != part.ack_token {
                return Err(BackendError::InvalidPart {
                    part_number: part.part_number,
                    reason: "acknowledgement token does not match".into(),
                });
            }
            let is_last = index + 1 == parts.len();
            if !is_last && data.len() < self.min_part_size {
                return Err(BackendError::EntityTooSmall {
                    part_number: part.part_number,
                    size: data.len(),
                    min: self.min_part_size,
                });
            }
            out.write_all(&data).await?;
        }
        out.flush().await?;
        drop(out);

        fs::rename(&staging, &target).await?;
        fs::remove_dir_all(&dir).await?;

        Ok(format!("file://{}", target.display()))
    }

    #[tracing::instrument(name = "fs.abort_upload", skip(self), err)]
    async fn abort_upload(&self, session_id: &str, key: &str) -> Result<(), BackendError> {
        let dir = self.open_session(session_id, key).await?;
        fs::remove_dir_all(&dir).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObjectStore for FilesystemBackend {
    async fn get_object(&self, key: &str) -> Result<Bytes, BackendError> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::NoSuchKey(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
