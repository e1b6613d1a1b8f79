// Performance metrics module
//
// Lightweight counters for the loading pipeline, tracked without locks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Loader pipeline metrics
///
/// Uses atomic operations so the worker thread can record without taking the
/// work-list lock. Collected for the lifetime of a [`Loader`](crate::Loader)
/// and logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Documents that completed loading
    pub documents_loaded: AtomicUsize,

    /// Documents that failed with a parse error
    pub documents_failed: AtomicUsize,

    /// Documents removed by `abort_loading` before completion
    pub documents_aborted: AtomicUsize,

    /// Total records parsed across all documents
    pub records_loaded: AtomicU64,

    /// Loader events broadcast to subscribers
    pub events_broadcast: AtomicU64,

    /// Broadcast sends with no live subscriber
    pub events_unobserved: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            documents_loaded: AtomicUsize::new(0),
            documents_failed: AtomicUsize::new(0),
            documents_aborted: AtomicUsize::new(0),
            records_loaded: AtomicU64::new(0),
            events_broadcast: AtomicU64::new(0),
            events_unobserved: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_document_loaded(&self) {
        self.documents_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_document_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_document_aborted(&self) {
        self.documents_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_records_loaded(&self, records: usize) {
        self.records_loaded
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_event_broadcast(&self) {
        self.events_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_unobserved(&self) {
        self.events_unobserved.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the loader was constructed.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log a metrics summary
    pub fn log_summary(&self) {
        tracing::info!(
            "Loader metrics: {} loaded, {} failed, {} aborted, {} records in {:.2}s",
            self.documents_loaded.load(Ordering::Relaxed),
            self.documents_failed.load(Ordering::Relaxed),
            self.documents_aborted.load(Ordering::Relaxed),
            self.records_loaded.load(Ordering::Relaxed),
            self.uptime().as_secs_f64()
        );
        tracing::info!(
            "Loader events: {} broadcast, {} unobserved",
            self.events_broadcast.load(Ordering::Relaxed),
            self.events_unobserved.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
