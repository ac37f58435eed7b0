//! Engine metric counters for UI/telemetry dashboards.
//!
//! The collector is an explicitly owned structure injected into the
//! components that write to it, never a process-wide global. It is a
//! write-only side channel: nothing in the routing path reads it back.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters written by the routing, assembly, and QoS layers.
#[derive(Debug, Default)]
pub struct MetricCollector {
    fec_recoveries: AtomicU64,
    total_fragments: AtomicU64,
    corrupt_fragments: AtomicU64,
    loop_drops: AtomicU64,
    expired_drops: AtomicU64,
    replay_drops: AtomicU64,
    invalid_packets: AtomicU64,
    qos_critical_sent: AtomicU64,
    qos_normal_sent: AtomicU64,
    qos_bulk_sent: AtomicU64,
    qos_bulk_dropped: AtomicU64,
    qos_average_delay_ms: AtomicU64,
}

/// Point-in-time copy of all counters, serializable for dashboards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub fec_recovery_count: u64,
    pub total_fragments: u64,
    pub corrupt_fragments: u64,
    pub loop_drops: u64,
    pub expired_drops: u64,
    pub replay_drops: u64,
    pub invalid_packets: u64,
    pub qos_critical_sent: u64,
    pub qos_normal_sent: u64,
    pub qos_bulk_sent: u64,
    pub qos_bulk_dropped: u64,
    pub qos_average_delay_ms: u64,
    /// Recoveries as a percentage of all fragments seen.
    pub fec_efficiency: f64,
}

impl MetricCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_fec_recovery(&self) {
        self.fec_recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_total_fragments(&self) {
        self.total_fragments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_corrupt_fragments(&self) {
        self.corrupt_fragments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_loop_drops(&self) {
        self.loop_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_expired_drops(&self) {
        self.expired_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_replay_drops(&self) {
        self.replay_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_invalid_packets(&self) {
        self.invalid_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_qos_critical_sent(&self) {
        self.qos_critical_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_qos_normal_sent(&self) {
        self.qos_normal_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_qos_bulk_sent(&self) {
        self.qos_bulk_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_qos_bulk_dropped(&self) {
        self.qos_bulk_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_qos_average_delay_ms(&self, delay_ms: u64) {
        self.qos_average_delay_ms.store(delay_ms, Ordering::Relaxed);
    }

    /// Copy every counter into a serializable snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_fragments = self.total_fragments.load(Ordering::Relaxed);
        let fec_recoveries = self.fec_recoveries.load(Ordering::Relaxed);

        MetricsSnapshot {
            fec_recovery_count: fec_recoveries,
            total_fragments,
            corrupt_fragments: self.corrupt_fragments.load(Ordering::Relaxed),
            loop_drops: self.loop_drops.load(Ordering::Relaxed),
            expired_drops: self.expired_drops.load(Ordering::Relaxed),
            replay_drops: self.replay_drops.load(Ordering::Relaxed),
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            qos_critical_sent: self.qos_critical_sent.load(Ordering::Relaxed),
            qos_normal_sent: self.qos_normal_sent.load(Ordering::Relaxed),
            qos_bulk_sent: self.qos_bulk_sent.load(Ordering::Relaxed),
            qos_bulk_dropped: self.qos_bulk_dropped.load(Ordering::Relaxed),
            qos_average_delay_ms: self.qos_average_delay_ms.load(Ordering::Relaxed),
            fec_efficiency: if total_fragments > 0 {
                fec_recoveries as f64 / total_fragments as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}
