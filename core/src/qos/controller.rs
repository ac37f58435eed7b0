//! Priority, admission, and delay decisions per message type.

use super::RuntimeMetrics;
use crate::message::{MessageType, QosLevel};
use crate::mode::OperatingMode;
use std::time::Duration;
use tracing::trace;

/// Stateless QoS policy. All decisions are pure functions of the
/// message type and a fresh `RuntimeMetrics` snapshot.
pub struct QosController;

impl QosController {
    pub fn new() -> Self {
        Self
    }

    /// Effective priority under current conditions.
    ///
    /// Critical traffic is never degraded; it is boosted on unstable
    /// networks so it wins queue contention when delivery is least
    /// certain. Bulk and normal tiers only move in emergency mode;
    /// daily mode keeps the static bases.
    pub fn calculate_priority(&self, message_type: MessageType, metrics: &RuntimeMetrics) -> u32 {
        let qos = message_type.qos();

        if qos == QosLevel::Critical {
            return if metrics.is_network_unstable() { 120 } else { 100 };
        }
        if metrics.mode == OperatingMode::Daily {
            return qos.base_priority();
        }

        let priority = match qos {
            QosLevel::Bulk => {
                if metrics.is_battery_critical() || metrics.queue_depth > 100 {
                    0
                } else if metrics.is_high_load() {
                    5
                } else {
                    10
                }
            }
            // Critical returned above.
            QosLevel::Critical | QosLevel::Normal => {
                // Later checks override earlier ones outright.
                let mut p = qos.base_priority();
                if metrics.peer_count > 20 {
                    p = 40;
                }
                if metrics.queue_depth > 100 {
                    p = 30;
                }
                if metrics.is_battery_critical() {
                    p = 35;
                }
                p
            }
        };
        trace!(?message_type, priority, "priority calculated");
        priority
    }

    /// Admission check. Zero-priority traffic and bulk under high load
    /// are refused; critical traffic is always admitted.
    pub fn should_send(&self, message_type: MessageType, metrics: &RuntimeMetrics) -> bool {
        let qos = message_type.qos();
        if qos == QosLevel::Critical {
            return true;
        }
        if self.calculate_priority(message_type, metrics) == 0 {
            return false;
        }
        !(qos == QosLevel::Bulk && metrics.is_high_load())
    }

    /// Scheduling delay. `None` means the message must not be
    /// scheduled at all (priority collapsed to zero).
    pub fn delay_for(
        &self,
        message_type: MessageType,
        metrics: &RuntimeMetrics,
    ) -> Option<Duration> {
        if message_type.qos() == QosLevel::Critical {
            return Some(Duration::ZERO);
        }

        let priority = self.calculate_priority(message_type, metrics);
        if priority == 0 {
            return None;
        }

        let ms = match metrics.mode {
            OperatingMode::Daily => match message_type.qos() {
                QosLevel::Critical => 0,
                QosLevel::Normal => 100,
                QosLevel::Bulk => 1000,
            },
            OperatingMode::Emergency => match priority {
                80.. => 0,
                50..=79 => 200,
                30..=49 => 500,
                10..=29 => 2000,
                _ => 5000,
            },
        };
        Some(Duration::from_millis(ms))
    }
}

impl Default for QosController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(
        mode: OperatingMode,
        peers: u32,
        queue: u32,
        battery: u8,
        stability: f32,
    ) -> RuntimeMetrics {
        RuntimeMetrics::new(mode, peers, queue, battery, stability).unwrap()
    }

    fn calm(mode: OperatingMode) -> RuntimeMetrics {
        metrics(mode, 5, 10, 80, 0.9)
    }

    #[test]
    fn test_critical_boosted_when_unstable_never_degraded() {
        let qos = QosController::new();
        let unstable = metrics(OperatingMode::Emergency, 50, 500, 1, 0.1);
        let stable = calm(OperatingMode::Emergency);

        assert_eq!(qos.calculate_priority(MessageType::Sos, &unstable), 120);
        assert_eq!(qos.calculate_priority(MessageType::Sos, &stable), 100);
        assert!(qos.should_send(MessageType::Sos, &unstable));
        assert_eq!(qos.delay_for(MessageType::Sos, &unstable), Some(Duration::ZERO));
    }

    #[test]
    fn test_daily_mode_keeps_static_bases() {
        let qos = QosController::new();
        let m = metrics(OperatingMode::Daily, 50, 500, 5, 0.2);
        assert_eq!(qos.calculate_priority(MessageType::Text, &m), 50);
        assert_eq!(qos.calculate_priority(MessageType::File, &m), 10);
    }

    #[test]
    fn test_emergency_bulk_collapses_on_battery_or_queue() {
        let qos = QosController::new();
        let low_battery = metrics(OperatingMode::Emergency, 5, 10, 15, 0.9);
        let deep_queue = metrics(OperatingMode::Emergency, 5, 150, 80, 0.9);

        assert_eq!(qos.calculate_priority(MessageType::File, &low_battery), 0);
        assert_eq!(qos.calculate_priority(MessageType::File, &deep_queue), 0);
        assert!(!qos.should_send(MessageType::File, &low_battery));
        assert_eq!(qos.delay_for(MessageType::File, &low_battery), None);
    }

    #[test]
    fn test_emergency_bulk_under_high_load() {
        let qos = QosController::new();
        let crowded = metrics(OperatingMode::Emergency, 25, 10, 80, 0.9);
        assert_eq!(qos.calculate_priority(MessageType::File, &crowded), 5);
        // Nonzero priority, still refused under high load.
        assert!(!qos.should_send(MessageType::File, &crowded));
    }

    #[test]
    fn test_emergency_normal_override_order() {
        let qos = QosController::new();
        let crowded = metrics(OperatingMode::Emergency, 25, 10, 80, 0.9);
        let deep_queue = metrics(OperatingMode::Emergency, 25, 150, 80, 0.9);
        let low_battery = metrics(OperatingMode::Emergency, 25, 150, 15, 0.9);

        assert_eq!(qos.calculate_priority(MessageType::Text, &crowded), 40);
        assert_eq!(qos.calculate_priority(MessageType::Text, &deep_queue), 30);
        // Battery wins over both earlier checks.
        assert_eq!(qos.calculate_priority(MessageType::Text, &low_battery), 35);
    }

    #[test]
    fn test_emergency_delay_bands() {
        let qos = QosController::new();
        // Calm emergency: NORMAL stays at base 50 -> 200ms band.
        assert_eq!(
            qos.delay_for(MessageType::Text, &calm(OperatingMode::Emergency)),
            Some(Duration::from_millis(200))
        );
        // Crowded: NORMAL drops to 40 -> 500ms band.
        let crowded = metrics(OperatingMode::Emergency, 25, 10, 80, 0.9);
        assert_eq!(
            qos.delay_for(MessageType::Text, &crowded),
            Some(Duration::from_millis(500))
        );
        // Calm bulk at priority 10 -> 2s band.
        assert_eq!(
            qos.delay_for(MessageType::File, &calm(OperatingMode::Emergency)),
            Some(Duration::from_millis(2000))
        );
    }

    #[test]
    fn test_daily_delays() {
        let qos = QosController::new();
        let m = calm(OperatingMode::Daily);
        assert_eq!(qos.delay_for(MessageType::Text, &m), Some(Duration::from_millis(100)));
        assert_eq!(
            qos.delay_for(MessageType::File, &m),
            Some(Duration::from_millis(1000))
        );
    }
}
