//! Batch of pending mutations
//!
//! ```text
//! Closed --begin--> Open --commit--> Flushing --ok--> Closed
//!                     ^                  |
//!                     +------failed------+
//! ```
//!
//! Mutations are applied to the engine as they are submitted; the queue
//! only remembers their outcomes until the batch is made durable. Commit
//! issues exactly one engine durability commit and then fires every
//! callback in submission order, whether or not the commit succeeded.

use std::collections::BTreeMap;

use super::errors::{QueueError, QueueResult};
use super::request::{MutationRequest, MutationStatus};
use crate::engine::{EngineError, EngineFile, EngineResult};

/// Batch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Accepting mutations
    Open,
    /// Durability commit and callbacks in progress
    Flushing,
    /// No transaction open
    Closed,
}

/// What happened during a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    /// Callbacks fired
    pub completed: usize,
    /// Requests whose recorded status was not success
    pub unsuccessful: usize,
    /// Whether the batch is durable
    pub durable: bool,
    /// Engine error of a failed durability commit
    pub error: Option<EngineError>,
}

impl CommitReport {
    fn empty() -> Self {
        Self {
            completed: 0,
            unsuccessful: 0,
            durable: true,
            error: None,
        }
    }
}

#[derive(Debug)]
pub struct MutationQueue {
    requests: Vec<MutationRequest>,
    state: BatchState,
}

impl Default for MutationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationQueue {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            state: BatchState::Closed,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Open a transaction. Opening an already open one is a no-op.
    pub fn begin(&mut self) {
        if self.state == BatchState::Closed {
            self.state = BatchState::Open;
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == BatchState::Open
    }

    /// Fail unless mutations are currently accepted.
    pub fn ensure_open(&self) -> QueueResult<()> {
        match self.state {
            BatchState::Open => Ok(()),
            BatchState::Flushing => Err(QueueError::Flushing),
            BatchState::Closed => Err(QueueError::NotInTransaction),
        }
    }

    /// Append an applied request to the batch.
    pub fn push(&mut self, request: MutationRequest) -> QueueResult<()> {
        self.ensure_open()?;
        self.requests.push(request);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Partitions touched by the batch, each with the highest by-seqno of a
    /// successful delete in it (0 when none).
    pub fn touched_partitions(&self) -> BTreeMap<u16, u64> {
        let mut touched = BTreeMap::new();
        for request in &self.requests {
            let entry = touched.entry(request.partition).or_insert(0u64);
            if request.is_deletion() && request.status == MutationStatus::Success {
                *entry = (*entry).max(request.by_seqno);
            }
        }
        touched
    }

    /// Make the batch durable and complete every request.
    ///
    /// An empty batch succeeds without touching the engine. After a failed
    /// durability commit the transaction stays open so the caller can
    /// resubmit.
    pub fn commit(&mut self, file: &dyn EngineFile) -> CommitReport {
        if self.requests.is_empty() {
            if self.state == BatchState::Open {
                self.state = BatchState::Closed;
            }
            return CommitReport::empty();
        }

        self.state = BatchState::Flushing;
        let result = file.commit();
        self.finish(result)
    }

    /// Complete every request without a durability commit, reporting the
    /// batch as not durable. The transaction stays open.
    pub fn fail_commit(&mut self, error: EngineError) -> CommitReport {
        self.state = BatchState::Flushing;
        self.finish(Err(error))
    }

    fn finish(&mut self, result: EngineResult<()>) -> CommitReport {
        let requests = std::mem::take(&mut self.requests);
        let completed = requests.len();
        let unsuccessful = requests
            .iter()
            .filter(|request| !request.status.is_success())
            .count();
        for request in requests {
            request.complete();
        }

        let durable = result.is_ok();
        self.state = if durable {
            BatchState::Closed
        } else {
            BatchState::Open
        };

        CommitReport {
            completed,
            unsuccessful,
            durable,
            error: result.err(),
        }
    }

    /// Complete every queued request as failed without committing and
    /// close the transaction. Returns the number of callbacks fired.
    pub fn abort(&mut self) -> usize {
        let requests = std::mem::take(&mut self.requests);
        let aborted = requests.len();
        for mut request in requests {
            if request.error.is_none() {
                request.error = Some(EngineError::Closed);
            }
            request.status = MutationStatus::Failed;
            request.complete();
        }
        self.state = BatchState::Closed;
        aborted
    }
}
