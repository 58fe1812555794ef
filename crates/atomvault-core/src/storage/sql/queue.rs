//! # Write-Back Queue
//!
//! Bounded queue of pending writes shared by the writer threads.
//!
//! Every item carries a slot key and a submission number. A worker takes the
//! oldest item whose slot has no write in flight, so writes to one slot apply
//! in submission order and writes to different slots apply in parallel.
//!
//! The barrier is a fence over submission numbers: it waits only for items
//! submitted before it started.

use crate::{Atom, Value, VaultError};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

// =============================================================================
// WORK ITEMS
// =============================================================================

/// A write the engine has accepted but not yet applied.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Atom(Atom),
    Value { atom: Atom, key: Atom, value: Value },
}

impl WriteOp {
    /// The slot this write serializes on.
    pub fn slot(&self) -> SlotKey {
        match self {
            Self::Atom(atom) => SlotKey::Atom(atom.clone()),
            Self::Value { atom, key, .. } => SlotKey::Value(atom.clone(), key.clone()),
        }
    }
}

/// Serialization key: at most one write per key is in flight.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlotKey {
    Atom(Atom),
    Value(Atom, Atom),
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(atom) => write!(f, "{}", atom),
            Self::Value(atom, key) => write!(f, "{} @ {}", atom, key),
        }
    }
}

#[derive(Debug)]
pub struct Job {
    pub seq: u64,
    pub slot: SlotKey,
    pub op: WriteOp,
}

// =============================================================================
// QUEUE
// =============================================================================

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Job>,
    /// Slots with a write in flight.
    busy: BTreeSet<SlotKey>,
    /// Submission numbers not yet completed (pending or in flight).
    outstanding: BTreeSet<u64>,
    next_seq: u64,
    /// First write failure since the last clear.
    failure: Option<String>,
    /// Live [`Paused`] guards. Workers take nothing while non-zero.
    pauses: usize,
    shutdown: bool,
}

#[derive(Debug)]
pub struct WriteQueue {
    state: Mutex<QueueState>,
    /// Signalled when a job may have become takeable.
    work_ready: Condvar,
    /// Signalled whenever a job completes.
    progress: Condvar,
    capacity: usize,
}

impl WriteQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            work_ready: Condvar::new(),
            progress: Condvar::new(),
            capacity,
        }
    }

    /// Accept a write. Waits for space when the queue is full.
    pub fn push(&self, op: WriteOp) -> Result<u64, VaultError> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return Err(VaultError::Connection("write queue is closed".to_string()));
            }
            if let Some(failure) = &state.failure {
                return Err(VaultError::WriteFailure(format!(
                    "queue is in failed state: {}",
                    failure
                )));
            }
            if state.outstanding.len() < self.capacity {
                break;
            }
            self.progress.wait(&mut state);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.outstanding.insert(seq);
        state.pending.push_back(Job {
            seq,
            slot: op.slot(),
            op,
        });
        tracing::trace!(seq, depth = state.outstanding.len(), "write queued");
        self.work_ready.notify_all();
        Ok(seq)
    }

    /// Take the oldest job whose slot is free. `None` once shut down and
    /// empty.
    pub fn take(&self) -> Option<Job> {
        let mut state = self.state.lock();
        loop {
            if state.pauses > 0 {
                self.work_ready.wait(&mut state);
                continue;
            }
            let QueueState { pending, busy, .. } = &mut *state;
            if let Some(pos) = pending.iter().position(|job| !busy.contains(&job.slot)) {
                let job = pending.remove(pos)?;
                busy.insert(job.slot.clone());
                return Some(job);
            }
            if state.shutdown && state.pending.is_empty() {
                return None;
            }
            self.work_ready.wait(&mut state);
        }
    }

    /// Record the outcome of a job taken with [`take`](Self::take).
    pub fn complete(&self, job: &Job, result: Result<(), VaultError>) {
        let mut state = self.state.lock();
        state.busy.remove(&job.slot);
        state.outstanding.remove(&job.seq);
        if let Err(err) = result {
            tracing::error!(seq = job.seq, slot = %job.slot, error = %err, "queued write failed");
            if state.failure.is_none() {
                state.failure = Some(format!("{}: {}", job.slot, err));
            }
        }
        self.work_ready.notify_all();
        self.progress.notify_all();
    }

    /// Wait until every job submitted before this call has completed.
    ///
    /// Fails with `WriteFailure` while the queue is in failed state.
    pub fn barrier(&self) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        let fence = state.next_seq;
        while state.outstanding.first().is_some_and(|seq| *seq < fence) {
            self.progress.wait(&mut state);
        }
        match &state.failure {
            Some(failure) => Err(VaultError::WriteFailure(failure.clone())),
            None => Ok(()),
        }
    }

    /// Wait until nothing is outstanding.
    pub fn drain(&self) {
        let mut state = self.state.lock();
        while !state.outstanding.is_empty() {
            self.progress.wait(&mut state);
        }
    }

    /// Wait until nothing is outstanding, then hold the workers off until
    /// the guard drops. Writes pushed meanwhile are accepted and queued.
    pub fn pause(&self) -> Paused<'_> {
        let mut state = self.state.lock();
        while !state.outstanding.is_empty() {
            self.progress.wait(&mut state);
        }
        state.pauses += 1;
        Paused { queue: self }
    }

    /// Stop accepting work. Workers exit once the queue is empty.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.work_ready.notify_all();
        self.progress.notify_all();
    }

    /// Leave failed state, returning the recorded failure.
    pub fn clear_failure(&self) -> Option<String> {
        let failure = self.state.lock().failure.take();
        if failure.is_some() {
            // Wake enqueuers that may be waiting for space.
            self.progress.notify_all();
        }
        failure
    }

    pub fn failure(&self) -> Option<String> {
        self.state.lock().failure.clone()
    }

    /// Number of jobs pending or in flight.
    pub fn depth(&self) -> usize {
        self.state.lock().outstanding.len()
    }
}

/// Keeps the writer threads idle. See [`WriteQueue::pause`].
#[must_use]
#[derive(Debug)]
pub struct Paused<'a> {
    queue: &'a WriteQueue,
}

impl Drop for Paused<'_> {
    fn drop(&mut self) {
        let mut state = self.queue.state.lock();
        state.pauses -= 1;
        if state.pauses == 0 {
            self.queue.work_ready.notify_all();
        }
    }
}
