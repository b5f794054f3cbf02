//! Job counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording print job counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_started: AtomicU64,
    jobs_ready: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_timed_out: AtomicU64,
    jobs_cancelled: AtomicU64,
    cancels_acknowledged: AtomicU64,
    cancels_rejected: AtomicU64,
    prints_rejected: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_started", "Metric incremented");
    }

    pub fn job_ready(&self) {
        self.jobs_ready.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_ready", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn job_timed_out(&self) {
        self.jobs_timed_out.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_timed_out", "Metric incremented");
    }

    pub fn job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_cancelled", "Metric incremented");
    }

    pub fn cancel_acknowledged(&self) {
        self.cancels_acknowledged.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cancels_acknowledged", "Metric incremented");
    }

    pub fn cancel_rejected(&self) {
        self.cancels_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cancels_rejected", "Metric incremented");
    }

    /// A second print was refused while one was in flight
    pub fn print_rejected(&self) {
        self.prints_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "prints_rejected", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_ready: self.jobs_ready.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_timed_out: self.jobs_timed_out.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            cancels_acknowledged: self.cancels_acknowledged.load(Ordering::Relaxed),
            cancels_rejected: self.cancels_rejected.load(Ordering::Relaxed),
            prints_rejected: self.prints_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_started: u64,
    pub jobs_ready: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub jobs_cancelled: u64,
    pub cancels_acknowledged: u64,
    pub cancels_rejected: u64,
    pub prints_rejected: u64,
}

impl MetricsSnapshot {
    /// Jobs that reached a terminal state
    pub fn jobs_finished(&self) -> u64 {
        self.jobs_ready + self.jobs_failed + self.jobs_timed_out + self.jobs_cancelled
    }
}
