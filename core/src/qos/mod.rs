//! QoS scheduling: priority classification, bounded priority queuing,
//! and single-flight dispatch with congestion-aware delays.

pub mod controller;
pub mod queue;
pub mod scheduler;

pub use controller::QosController;
pub use queue::PriorityMessageQueue;
pub use scheduler::{DispatchOutcome, DispatchScheduler, RAW_DISPATCH_REFUSAL_SCORE};

use crate::mode::OperatingMode;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("battery level {0} outside 0-100")]
    BatteryOutOfRange(u8),
    #[error("network stability {0} outside 0.0-1.0")]
    StabilityOutOfRange(f32),
}

/// Snapshot of node conditions, built fresh per scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeMetrics {
    pub mode: OperatingMode,
    pub peer_count: u32,
    pub queue_depth: u32,
    pub battery_level: u8,
    pub network_stability: f32,
}

impl RuntimeMetrics {
    /// Out-of-range inputs are a caller bug surfaced at construction,
    /// not a condition scheduling logic has to tolerate.
    pub fn new(
        mode: OperatingMode,
        peer_count: u32,
        queue_depth: u32,
        battery_level: u8,
        network_stability: f32,
    ) -> Result<Self, MetricsError> {
        if battery_level > 100 {
            return Err(MetricsError::BatteryOutOfRange(battery_level));
        }
        if !(0.0..=1.0).contains(&network_stability) {
            return Err(MetricsError::StabilityOutOfRange(network_stability));
        }
        Ok(Self {
            mode,
            peer_count,
            queue_depth,
            battery_level,
            network_stability,
        })
    }

    pub fn is_high_load(&self) -> bool {
        self.peer_count > 20 || self.queue_depth > 100
    }

    pub fn is_battery_critical(&self) -> bool {
        self.battery_level < 20
    }

    pub fn is_network_unstable(&self) -> bool {
        self.network_stability < 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_metrics_construct() {
        let m = RuntimeMetrics::new(OperatingMode::Daily, 5, 10, 80, 0.9).unwrap();
        assert!(!m.is_high_load());
        assert!(!m.is_battery_critical());
        assert!(!m.is_network_unstable());
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert_eq!(
            RuntimeMetrics::new(OperatingMode::Daily, 0, 0, 101, 0.5),
            Err(MetricsError::BatteryOutOfRange(101))
        );
        assert!(matches!(
            RuntimeMetrics::new(OperatingMode::Daily, 0, 0, 50, 1.5),
            Err(MetricsError::StabilityOutOfRange(_))
        ));
        assert!(matches!(
            RuntimeMetrics::new(OperatingMode::Daily, 0, 0, 50, -0.1),
            Err(MetricsError::StabilityOutOfRange(_))
        ));
    }

    #[test]
    fn test_load_helpers() {
        let m = RuntimeMetrics::new(OperatingMode::Emergency, 25, 0, 15, 0.4).unwrap();
        assert!(m.is_high_load());
        assert!(m.is_battery_critical());
        assert!(m.is_network_unstable());

        let q = RuntimeMetrics::new(OperatingMode::Emergency, 3, 150, 90, 0.8).unwrap();
        assert!(q.is_high_load());
    }
}
