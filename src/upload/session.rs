//! Multipart session state

use crate::backend::CompletedPart;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opened on the backend, no part sent yet
    Initiated,
    /// At least one part acknowledged
    Uploading,
    Completed,
    /// Stopped by an unrecoverable error; still pending on the backend
    Failed,
    /// Aborted on the backend
    Abandoned,
}

/// One uploaded chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    pub part_number: u32,
    pub byte_length: usize,
    pub is_final: bool,
    pub ack_token: String,
}

/// One in-progress multipart upload
///
/// Owned by a single orchestration run. Part records are appended in part
/// number order, starting at 1 without gaps.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub object_key: String,
    pub session_id: String,
    pub parts: Vec<PartRecord>,
    pub state: SessionState,
}

impl UploadSession {
    pub fn new(object_key: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            object_key: object_key.into(),
            session_id: session_id.into(),
            parts: Vec::new(),
            state: SessionState::Initiated,
        }
    }

    /// Number the next part will carry
    pub fn next_part_number(&self) -> u32 {
        self.parts.last().map_or(1, |p| p.part_number + 1)
    }

    /// Append an acknowledged part
    pub fn record_part(&mut self, record: PartRecord) {
        debug_assert_eq!(record.part_number, self.next_part_number());
        debug_assert!(!self.parts.last().map_or(false, |p| p.is_final));
        self.parts.push(record);
        self.state = SessionState::Uploading;
    }

    /// Part list for the completion request
    pub fn completed_parts(&self) -> Vec<CompletedPart> {
        self.parts
            .iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                ack_token: p.ack_token.clone(),
            })
            .collect()
    }

    pub fn part_count(&self) -> u32 {
        self.parts.last().map_or(0, |p| p.part_number)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.parts.iter().map(|p| p.byte_length as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(part_number: u32, byte_length: usize, is_final: bool) -> PartRecord {
        PartRecord {
            part_number,
            byte_length,
            is_final,
            ack_token: format!("etag-{}", part_number),
        }
    }

    #[test]
    fn test_new_session() {
        let session = UploadSession::new("key", "id");
        assert_eq!(session.state, SessionState::Initiated);
        assert_eq!(session.next_part_number(), 1);
        assert_eq!(session.part_count(), 0);
        assert!(session.completed_parts().is_empty());
    }

    #[test]
    fn test_record_parts() {
        let mut session = UploadSession::new("key", "id");
        session.record_part(record(1, 10, false));
        session.record_part(record(2, 4, true));

        assert_eq!(session.state, SessionState::Uploading);
        assert_eq!(session.part_count(), 2);
        assert_eq!(session.bytes_uploaded(), 14);
        assert_eq!(
            session.completed_parts(),
            vec![
                CompletedPart {
                    part_number: 1,
                    ack_token: "etag-1".into()
                },
                CompletedPart {
                    part_number: 2,
                    ack_token: "etag-2".into()
                },
            ]
        );
    }
}
