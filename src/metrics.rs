//! Failover Metrics
//!
//! Probe, rebuild and data-operation counters shared by the manager and
//! its regional connections.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector
#[derive(Debug)]
pub struct FailoverMetrics {
    probes: AtomicU64,
    probes_denied: AtomicU64,
    probes_failed: AtomicU64,
    poll_cycles: AtomicU64,
    poll_panics: AtomicU64,
    rebuilds: AtomicU64,
    demotions: AtomicU64,
    connect_failures: AtomicU64,

    /// Data operations per name
    ops_by_name: RwLock<HashMap<&'static str, u64>>,

    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl Default for FailoverMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FailoverMetrics {
    pub fn new() -> Self {
        Self {
            probes: AtomicU64::new(0),
            probes_denied: AtomicU64::new(0),
            probes_failed: AtomicU64::new(0),
            poll_cycles: AtomicU64::new(0),
            poll_panics: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
            demotions: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            ops_by_name: RwLock::new(HashMap::new()),
            latency_sum_us: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
        }
    }

    pub fn record_probe(&self) {
        self.probes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_denied(&self) {
        self.probes_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_failed(&self) {
        self.probes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_cycle(&self) {
        self.poll_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_panic(&self) {
        self.poll_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_demotion(&self) {
        self.demotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a data operation and its latency
    pub fn record_operation(&self, name: &'static str, latency: Duration) {
        *self.ops_by_name.write().entry(name).or_insert(0) += 1;

        let latency_us = latency.as_micros() as u64;
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_min_us.fetch_min(latency_us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    pub fn probes_denied(&self) -> u64 {
        self.probes_denied.load(Ordering::Relaxed)
    }

    pub fn probes_failed(&self) -> u64 {
        self.probes_failed.load(Ordering::Relaxed)
    }

    pub fn poll_cycles(&self) -> u64 {
        self.poll_cycles.load(Ordering::Relaxed)
    }

    pub fn poll_panics(&self) -> u64 {
        self.poll_panics.load(Ordering::Relaxed)
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    pub fn demotions(&self) -> u64 {
        self.demotions.load(Ordering::Relaxed)
    }

    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
    }

    pub fn total_ops(&self) -> u64 {
        self.latency_count.load(Ordering::Relaxed)
    }

    pub fn ops_by_name(&self) -> HashMap<&'static str, u64> {
        self.ops_by_name.read().clone()
    }

    /// Average latency in microseconds
    pub fn avg_latency_us(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        sum as f64 / count as f64
    }

    pub fn min_latency_us(&self) -> u64 {
        let min = self.latency_min_us.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    pub fn max_latency_us(&self) -> u64 {
        self.latency_max_us.load(Ordering::Relaxed)
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "Probes: {} (denied={}, failed={}) | Polls: {} | Rebuilds: {} | Demotions: {} | Ops: {} | Latency (µs): avg={:.1}, min={}, max={}",
            self.probes(),
            self.probes_denied(),
            self.probes_failed(),
            self.poll_cycles(),
            self.rebuilds(),
            self.demotions(),
            self.total_ops(),
            self.avg_latency_us(),
            self.min_latency_us(),
            self.max_latency_us()
        )
    }
}
