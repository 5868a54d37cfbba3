//! Event Batcher
//!
//! Buffers incoming audit events into an open batch and seals it on
//! capacity or explicit flush. Sealing assigns the immutable leaf-hash
//! sequence the Merkle builder commits to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChainError;
use crate::event::AuditEvent;

/// Default number of events per batch before auto-sealing.
pub const DEFAULT_BATCH_CAPACITY: usize = 100;

/// An open (or sealed) batch of audit events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub seq: u64,
    pub events: Vec<AuditEvent>,
    pub sealed: bool,
}

impl Batch {
    fn new(seq: u64) -> Self {
        Self {
            seq,
            events: Vec::new(),
            sealed: false,
        }
    }

    /// Append an event; returns its position within the batch.
    pub fn append(&mut self, event: AuditEvent) -> Result<usize, ChainError> {
        if self.sealed {
            return Err(ChainError::SealedBatchAppend { seq: self.seq });
        }
        self.events.push(event);
        Ok(self.events.len() - 1)
    }

    /// Seal the batch, assigning each event its ordered leaf hash.
    pub fn seal(mut self) -> Result<SealedBatch, ChainError> {
        if self.events.is_empty() {
            return Err(ChainError::EmptyBatch);
        }
        self.sealed = true;
        let leaf_hashes = self.events.iter().map(AuditEvent::hash).collect();
        Ok(SealedBatch {
            seq: self.seq,
            events: self.events,
            leaf_hashes,
            sealed_at: Utc::now(),
        })
    }
}

/// A sealed batch: events and their leaf-hash sequence are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedBatch {
    pub seq: u64,
    pub events: Vec<AuditEvent>,
    pub leaf_hashes: Vec<String>,
    pub sealed_at: DateTime<Utc>,
}

impl SealedBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Find the leaf index of an event by id.
    pub fn position_of(&self, event_id: &uuid::Uuid) -> Option<usize> {
        self.events.iter().position(|e| &e.id == event_id)
    }
}

/// Outcome of appending an event to the batcher.
#[derive(Debug)]
pub struct AppendOutcome {
    /// Position of the event within its batch.
    pub position: usize,
    /// Sequence number of the batch the event landed in.
    pub batch_seq: u64,
    /// Present when the append filled the batch to capacity.
    pub sealed: Option<SealedBatch>,
}

/// Buffers events into batches with contiguous, strictly increasing
/// sequence numbers. Callers must serialize access (the ledger facade
/// holds the writer lock), so sealing happens on exactly one thread.
#[derive(Debug)]
pub struct EventBatcher {
    capacity: usize,
    next_seq: u64,
    open: Batch,
}

impl EventBatcher {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_seq: 1,
            open: Batch::new(0),
        }
    }

    /// Append a validated event to the open batch, auto-sealing when the
    /// configured capacity is reached.
    pub fn append(&mut self, event: AuditEvent) -> Result<AppendOutcome, ChainError> {
        event.validate()?;

        let batch_seq = self.open.seq;
        let position = self.open.append(event)?;

        let sealed = if self.open.events.len() >= self.capacity {
            Some(self.rotate()?)
        } else {
            None
        };

        Ok(AppendOutcome {
            position,
            batch_seq,
            sealed,
        })
    }

    /// Explicitly seal the open batch, even if partially filled.
    ///
    /// Returns `None` when there is nothing buffered.
    pub fn flush(&mut self) -> Result<Option<SealedBatch>, ChainError> {
        if self.open.events.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.rotate()?))
    }

    /// Number of events buffered in the open batch.
    pub fn pending(&self) -> usize {
        self.open.events.len()
    }

    /// Sequence number of the currently open batch.
    pub fn open_seq(&self) -> u64 {
        self.open.seq
    }

    fn rotate(&mut self) -> Result<SealedBatch, ChainError> {
        let next = Batch::new(self.next_seq);
        self.next_seq += 1;
        let full = std::mem::replace(&mut self.open, next);
        let sealed = full.seal()?;
        debug!(
            batch_seq = sealed.seq,
            events = sealed.len(),
            "Sealed audit batch"
        );
        Ok(sealed)
    }
}

impl Default for EventBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_CAPACITY)
    }
}
