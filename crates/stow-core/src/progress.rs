//! Progress reporting and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Receives progress ticks from a pipeline run.
///
/// Implementations must tolerate calls from collector worker threads.
pub trait ProgressMonitor: Send + Sync {
    /// Called once per run with the total number of ticks that will be reported.
    fn begin(&self, _task: &str, _total_ticks: u64) {}

    /// Name of the step currently executing (phase id, artifact, ...).
    fn subtask(&self, _name: &str) {}

    fn worked(&self, ticks: u64);

    fn done(&self) {}
}

/// Monitor that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressMonitor for NullProgress {
    fn worked(&self, _ticks: u64) {}
}

/// Monitor that counts ticks; handy for callers that poll completion.
#[derive(Debug, Default)]
pub struct CountingProgress {
    total: AtomicU64,
    worked: AtomicU64,
    finished: AtomicBool,
}

impl CountingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn worked_ticks(&self) -> u64 {
        self.worked.load(Ordering::SeqCst)
    }

    pub fn is_done(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ProgressMonitor for CountingProgress {
    fn begin(&self, _task: &str, total_ticks: u64) {
        self.total.store(total_ticks, Ordering::SeqCst);
    }

    fn worked(&self, ticks: u64) {
        self.worked.fetch_add(ticks, Ordering::SeqCst);
    }

    fn done(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// Shared cancellation flag.
///
/// Clones observe the same flag, so a controlling thread can keep one clone
/// and cancel a run executing on a worker thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A fixed budget of ticks carved out of a parent monitor.
///
/// Advancing never reports more than the budget; `finish` reports whatever is
/// left so that every slice contributes exactly its budget once.
pub struct ProgressSlice<'a> {
    monitor: &'a dyn ProgressMonitor,
    budget: u64,
    spent: AtomicU64,
}

impl<'a> ProgressSlice<'a> {
    pub fn new(monitor: &'a dyn ProgressMonitor, budget: u64) -> Self {
        Self {
            monitor,
            budget,
            spent: AtomicU64::new(0),
        }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn remaining(&self) -> u64 {
        self.budget - self.spent.load(Ordering::SeqCst)
    }

    pub fn monitor(&self) -> &'a dyn ProgressMonitor {
        self.monitor
    }

    /// Report up to `ticks`, clamped to the remaining budget. Returns the ticks reported.
    pub fn advance(&self, ticks: u64) -> u64 {
        let mut reported = 0;
        let _ = self
            .spent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |spent| {
                reported = ticks.min(self.budget - spent);
                Some(spent + reported)
            });
        if reported > 0 {
            self.monitor.worked(reported);
        }
        reported
    }

    pub fn finish(&self) {
        self.advance(self.remaining());
    }
}

/// Split `total` ticks proportionally to `weights`.
///
/// Rounding remainders go to the last part so the parts always sum to `total`.
/// With all-zero weights the last part receives everything.
pub fn split_ticks(total: u64, weights: &[u64]) -> Vec<u64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let sum: u128 = weights.iter().map(|w| u128::from(*w)).sum();
    let mut parts = vec![0u64; weights.len()];
    let mut assigned = 0u64;
    if sum > 0 {
        for (part, weight) in parts.iter_mut().zip(weights).take(weights.len() - 1) {
            *part = (u128::from(total) * u128::from(*weight) / sum) as u64;
            assigned += *part;
        }
    }
    if let Some(last) = parts.last_mut() {
        *last = total - assigned;
    }
    parts
}
