//! Mutation requests and their outcomes

use std::fmt;

use serde::Serialize;

use crate::engine::{EngineError, EngineResult};

/// Outcome of one mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    /// Not yet applied
    Pending,
    Success,
    /// The key did not exist (or was already deleted)
    NotFound,
    Failed,
}

impl MutationStatus {
    /// Map an engine call result onto a mutation outcome.
    pub fn from_engine(result: &EngineResult<()>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) if e.is_not_found() => Self::NotFound,
            Err(_) => Self::Failed,
        }
    }

    /// Raw status code handed to the engine layer: failed = -1,
    /// not-found = 0, success = 1. A pending request reports as failed.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 1,
            Self::NotFound => 0,
            Self::Failed | Self::Pending => -1,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// What a set callback receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationResult {
    pub status: MutationStatus,
    /// Always false: this backend does not replicate
    pub was_replicated: bool,
}

impl MutationResult {
    pub fn new(status: MutationStatus) -> Self {
        Self {
            status,
            was_replicated: false,
        }
    }
}

/// Completion callback of a set
pub type SetCallback = Box<dyn FnOnce(MutationResult) + Send>;

/// Completion callback of a delete
pub type DeleteCallback = Box<dyn FnOnce(MutationStatus) + Send>;

/// Callback attached to a request, by kind
pub enum Completion {
    Set(SetCallback),
    Delete(DeleteCallback),
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(_) => f.write_str("Completion::Set"),
            Self::Delete(_) => f.write_str("Completion::Delete"),
        }
    }
}

/// A set or delete waiting for its batch to commit.
#[derive(Debug)]
pub struct MutationRequest {
    pub partition: u16,
    pub key: Vec<u8>,
    /// Position of the mutation in the partition's sequence
    pub by_seqno: u64,
    pub status: MutationStatus,
    /// Engine error behind a failed status
    pub error: Option<EngineError>,
    completion: Completion,
}

impl MutationRequest {
    pub fn set(partition: u16, key: Vec<u8>, by_seqno: u64, callback: SetCallback) -> Self {
        Self {
            partition,
            key,
            by_seqno,
            status: MutationStatus::Pending,
            error: None,
            completion: Completion::Set(callback),
        }
    }

    pub fn delete(partition: u16, key: Vec<u8>, by_seqno: u64, callback: DeleteCallback) -> Self {
        Self {
            partition,
            key,
            by_seqno,
            status: MutationStatus::Pending,
            error: None,
            completion: Completion::Delete(callback),
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self.completion, Completion::Delete(_))
    }

    /// Record the outcome of the engine call.
    pub fn record(&mut self, result: EngineResult<()>) {
        self.status = MutationStatus::from_engine(&result);
        self.error = result.err();
    }

    /// Record a failure that happened before the engine was reached.
    pub fn record_failure(&mut self, error: EngineError) {
        self.status = MutationStatus::Failed;
        self.error = Some(error);
    }

    /// Fire the callback with the recorded status, consuming the request.
    pub fn complete(self) {
        match self.completion {
            Completion::Set(callback) => callback(MutationResult::new(self.status)),
            Completion::Delete(callback) => callback(self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_engine_status_mapping() {
        assert_eq!(MutationStatus::from_engine(&Ok(())), MutationStatus::Success);
        for err in [
            EngineError::KeyNotFound,
            EngineError::NoSuchFile("x".into()),
            EngineError::NoDbHeaders("x".into()),
        ] {
            assert_eq!(MutationStatus::from_engine(&Err(err)), MutationStatus::NotFound);
        }
        assert_eq!(
            MutationStatus::from_engine(&Err(EngineError::WriteFailed("disk".into()))),
            MutationStatus::Failed
        );
        assert_eq!(
            MutationStatus::from_engine(&Err(EngineError::Closed)),
            MutationStatus::Failed
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(MutationStatus::Failed.code(), -1);
        assert_eq!(MutationStatus::NotFound.code(), 0);
        assert_eq!(MutationStatus::Success.code(), 1);
    }

    #[test]
    fn test_complete_delivers_recorded_status() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let mut set = MutationRequest::set(
            0,
            b"k".to_vec(),
            1,
            Box::new(move |r: MutationResult| sink.lock().unwrap().push((r.status, r.was_replicated))),
        );
        set.record(Ok(()));
        set.complete();

        let sink = Arc::clone(&seen);
        let mut delete = MutationRequest::delete(
            0,
            b"k".to_vec(),
            2,
            Box::new(move |s: MutationStatus| sink.lock().unwrap().push((s, false))),
        );
        assert!(delete.is_deletion());
        delete.record(Err(EngineError::KeyNotFound));
        delete.complete();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (MutationStatus::Success, false),
                (MutationStatus::NotFound, false)
            ]
        );
    }
}
