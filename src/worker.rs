//! Bounded concurrent consumer of backup events (C3).
//!
//! Grounded on a `ParallelHandler`-style executor: a bounded
//! `crossbeam_channel`, N long-lived `std::thread` workers, threads joined
//! on `Drop`. Unlike that executor, a single failing event never aborts
//! the whole pool — retries and eventual drop are per-event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use log::{info, warn};

use crate::hash;
use crate::store::{Store, StoreError};
use crate::types::{BackupEvent, EventKind};

/// Runtime counters exposed by `Stats()`.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
}

impl WorkerStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

/// Single pool shared across all kinds — a deliberate simplification from
/// a one-goroutine-per-GVK worker model; see DESIGN.md.
pub struct WorkerPool {
    sender: Option<Sender<BackupEvent>>,
    handles: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
    max_retries: u32,
}

impl WorkerPool {
    /// Spawns `worker_count` threads, each draining the shared bounded
    /// queue until it is closed. `queue_capacity` bounds the channel;
    /// `Enqueue` blocks once it is full, applying backpressure to whatever
    /// called it (the dispatcher).
    pub fn start(
        store: Arc<dyn Store>,
        worker_count: usize,
        queue_capacity: usize,
        max_retries: u32,
    ) -> Self {
        let (sender, receiver) = bounded::<BackupEvent>(queue_capacity);
        let stats = Arc::new(WorkerStats::default());

        let mut handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let receiver = receiver.clone();
            let store = Arc::clone(&store);
            let stats = Arc::clone(&stats);
            handles.push(
                std::thread::Builder::new()
                    .name(format!("backup-worker-{i}"))
                    .spawn(move || {
                        while let Ok(event) = receiver.recv() {
                            process_event(&*store, &event, max_retries);
                            stats.processed.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                    .expect("failed to spawn backup worker thread"),
            );
        }

        Self {
            sender: Some(sender),
            handles,
            stats,
            max_retries,
        }
    }

    /// Non-blocking if the queue has capacity; blocks when full.
    pub fn enqueue(&self, event: BackupEvent) {
        let Some(sender) = &self.sender else {
            warn!("backup worker pool queue is closed, dropping event");
            return;
        };
        if sender.send(event).is_err() {
            warn!("backup worker pool queue is closed, dropping event");
        }
    }

    pub fn stats(&self) -> (u64, usize) {
        let depth = self.sender.as_ref().map(Sender::len).unwrap_or(0);
        (self.stats.processed(), depth)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // A struct's own `drop` body runs before its fields are dropped, so
        // the `sender` field would still be alive (and the channel still
        // open) for the whole body below if we let it drop implicitly.
        // Explicitly drop it first so the channel closes and every worker's
        // blocking `recv()` wakes with a disconnect before we join them.
        drop(self.sender.take());
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

/// Distinguishes the error taxonomy from spec.md §7: `Retryable` covers
/// `TransientIO`/`MarshalError` and consumes the retry budget;
/// `Terminal` covers `InvariantViolation` (retry cannot possibly succeed,
/// e.g. `MarkTombstone` on a record that was never created) and drops the
/// event on the first occurrence.
enum ProcessError {
    Retryable(anyhow::Error),
    Terminal(anyhow::Error),
}

/// Bounded linear retry, no backoff, no dead-letter queue: exceeding
/// `max_retries` logs and drops the event. An `InvariantViolation` is
/// never retried — it is logged and dropped immediately.
fn process_event(store: &dyn Store, event: &BackupEvent, max_retries: u32) {
    let mut attempt = 0;
    loop {
        let outcome = match event.event_kind {
            EventKind::Delete => mark_tombstone(store, event),
            EventKind::Create | EventKind::Update => try_write(store, event),
        };

        match outcome {
            Ok(()) => return,
            Err(ProcessError::Terminal(err)) => {
                warn!("dropping {} for {}: {}", event.event_kind, event.key, err);
                return;
            }
            Err(ProcessError::Retryable(err)) => {
                attempt += 1;
                if attempt >= max_retries {
                    warn!(
                        "giving up on {} after {} attempts: {}",
                        event.key, attempt, err
                    );
                    return;
                }
                warn!(
                    "{} for {} failed (attempt {}/{}): {}",
                    event.event_kind, event.key, attempt, max_retries, err
                );
            }
        }
    }
}

fn mark_tombstone(store: &dyn Store, event: &BackupEvent) -> Result<(), ProcessError> {
    store.mark_tombstone(&event.key).map_err(|err| match err {
        StoreError::NoSuchRecord(_) => ProcessError::Terminal(err.into()),
        other => ProcessError::Retryable(other.into()),
    })
}

fn try_write(store: &dyn Store, event: &BackupEvent) -> Result<(), ProcessError> {
    let new_hash = hash::hash(&event.manifest).map_err(|err| ProcessError::Retryable(err.into()))?;
    let (_, old_hash) = store
        .read(&event.key)
        .map_err(|err| ProcessError::Retryable(err.into()))?;
    if new_hash == old_hash {
        // I5: identical content, zero writes.
        return Ok(());
    }
    let changed = store
        .write(&event.key, &event.manifest, &new_hash)
        .map_err(|err| ProcessError::Retryable(err.into()))?;
    if changed {
        info!("backup successful for {}", event.key);
    }
    Ok(())
}
