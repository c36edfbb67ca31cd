//! Periodically reconciles tombstones against live cluster state before
//! reclaiming space (C6).
//!
//! The ticking/select shape mirrors a `select { case <-ctx.Done(): ...;
//! case <-ticker.C: ... }` loop, adapted to `tokio::select!`; a
//! scheduled-job idiom would give a one-shot form of the same sweep but is
//! not used here because this GC is a standing sweeper, not an on-demand
//! job.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{info, warn};

use crate::cancel::CancelToken;
use crate::external::{ClusterProbe, ProbeOutcome};
use crate::store::Store;
use crate::types::{Gvr, PluralizeKind, SuffixPluralizer};

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub reclaimed: u64,
    pub retracted: u64,
    pub skipped_transient: u64,
}

pub struct GarbageCollector {
    store: Arc<dyn Store>,
    cluster: Arc<dyn ClusterProbe>,
    retain_period: Duration,
    pluralizer: Box<dyn PluralizeKind + Send + Sync>,
}

impl GarbageCollector {
    pub fn new(store: Arc<dyn Store>, cluster: Arc<dyn ClusterProbe>, retain_period: Duration) -> Self {
        Self {
            store,
            cluster,
            retain_period,
            pluralizer: Box::new(SuffixPluralizer),
        }
    }

    /// Swaps in a proper singular->plural mapping supplied by the
    /// cluster's discovery interface, instead of the lowercase-kind-plus-"s"
    /// approximation.
    pub fn with_pluralizer(mut self, pluralizer: Box<dyn PluralizeKind + Send + Sync>) -> Self {
        self.pluralizer = pluralizer;
        self
    }

    /// Runs the sweep on the interval equal to `retain_period`, until
    /// `cancel` fires. One task for the whole process.
    pub async fn run(&self, cancel: CancelToken) {
        info!("starting garbage collector (retain period {:?})", self.retain_period);
        let mut ticker = tokio::time::interval(self.retain_period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("garbage collector stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let stats = self.sweep();
                    info!(
                        "gc sweep done: {} reclaimed, {} retracted, {} skipped (transient)",
                        stats.reclaimed, stats.retracted, stats.skipped_transient
                    );
                }
            }
        }
    }

    /// A single sweep pass. Never panics on a single bad entry: any
    /// failure is logged and the entry is reconsidered next sweep.
    pub fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::default();

        let entries = match self.store.list_tombstones() {
            Ok(entries) => entries,
            Err(err) => {
                warn!("garbage collection sweep failed to list tombstones: {err}");
                return stats;
            }
        };

        let now = SystemTime::now();
        for entry in entries {
            let age = match now.duration_since(entry.mod_time) {
                Ok(age) => age,
                Err(_) => Duration::ZERO, // clock skew: treat as freshly tombstoned
            };
            if age <= self.retain_period {
                continue;
            }

            let gvr = Gvr::new(
                entry.key.gvk.group.clone(),
                entry.key.gvk.version.clone(),
                self.pluralizer.pluralize(&entry.key.gvk.kind),
            );

            match self.cluster.get(&gvr, &entry.key.namespace, &entry.key.name) {
                ProbeOutcome::NotFound => match self.store.delete(&entry.key) {
                    Ok(()) => {
                        stats.reclaimed += 1;
                        info!("reclaimed tombstoned resource {}", entry.key);
                    }
                    Err(err) => warn!("failed to reclaim {}: {}", entry.key, err),
                },
                ProbeOutcome::Found => match self.store.delete_tombstone(&entry.key) {
                    Ok(()) => {
                        stats.retracted += 1;
                        info!("retracted tombstone for resurrected resource {}", entry.key);
                    }
                    Err(err) => warn!("failed to retract tombstone for {}: {}", entry.key, err),
                },
                ProbeOutcome::Error(message) => {
                    stats.skipped_transient += 1;
                    warn!("transient cluster probe error for {}: {}, will retry next sweep", entry.key, message);
                }
            }
        }

        stats
    }
}
