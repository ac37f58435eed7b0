//! Single-flight dispatch with QoS- and congestion-derived delays.

use super::{QosController, RuntimeMetrics};
use crate::congestion::MeshStateAnalyzer;
use crate::message::{MessageEnvelope, QosLevel};
use crate::metrics::MetricCollector;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Above this score the non-QoS path refuses to transmit at all.
pub const RAW_DISPATCH_REFUSAL_SCORE: u8 = 95;

/// What happened to a dispatch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Accepted; the action will fire after the computed delay.
    Dispatched,
    /// A previous dispatch is still in flight.
    Busy,
    /// Refused by QoS or congestion policy.
    Refused,
}

/// Releases the single-flight gate on drop, so the gate opens again
/// even when the send action panics mid-flight.
struct FlightGuard {
    gate: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.gate.store(false, Ordering::Release);
    }
}

/// One-at-a-time outbound dispatcher.
///
/// The delay applied to each send is the worse of the QoS delay (per
/// message type and node conditions) and the congestion backoff, so a
/// lightly loaded node still backs off on a saturated channel.
pub struct DispatchScheduler {
    in_flight: Arc<AtomicBool>,
    qos: QosController,
    analyzer: Arc<MeshStateAnalyzer>,
    metrics: Arc<MetricCollector>,
}

impl DispatchScheduler {
    pub fn new(analyzer: Arc<MeshStateAnalyzer>, metrics: Arc<MetricCollector>) -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
            qos: QosController::new(),
            analyzer,
            metrics,
        }
    }

    /// Dispatch one envelope through QoS policy.
    ///
    /// `action` runs on a spawned task after the delay; the gate stays
    /// held until it returns (or unwinds).
    pub fn dispatch<F>(
        &self,
        envelope: MessageEnvelope,
        runtime: &RuntimeMetrics,
        action: F,
    ) -> DispatchOutcome
    where
        F: FnOnce(MessageEnvelope) + Send + 'static,
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return DispatchOutcome::Busy;
        }
        let guard = FlightGuard {
            gate: Arc::clone(&self.in_flight),
        };

        let message_type = envelope.message_type;
        if !self.qos.should_send(message_type, runtime) {
            if message_type.qos() == QosLevel::Bulk {
                self.metrics.incr_qos_bulk_dropped();
            }
            debug!(message_id = %envelope.id, ?message_type, "dispatch refused by policy");
            return DispatchOutcome::Refused;
        }

        let qos_delay = match self.qos.delay_for(message_type, runtime) {
            Some(d) => d,
            None => {
                if message_type.qos() == QosLevel::Bulk {
                    self.metrics.incr_qos_bulk_dropped();
                }
                return DispatchOutcome::Refused;
            }
        };
        let delay = qos_delay.max(self.analyzer.current_delay());

        match message_type.qos() {
            QosLevel::Critical => self.metrics.incr_qos_critical_sent(),
            QosLevel::Normal => self.metrics.incr_qos_normal_sent(),
            QosLevel::Bulk => self.metrics.incr_qos_bulk_sent(),
        }
        self.metrics.set_qos_average_delay_ms(delay.as_millis() as u64);

        let priority = self.qos.calculate_priority(message_type, runtime);
        let envelope = envelope.with_priority(priority);
        debug!(message_id = %envelope.id, ?delay, priority, "dispatch scheduled");

        tokio::spawn(async move {
            let _guard = guard;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            action(envelope);
        });
        DispatchOutcome::Dispatched
    }

    /// Congestion-only path for traffic that bypasses QoS (beacons,
    /// raw relays). Refuses outright on a saturated channel.
    pub fn dispatch_raw<F>(&self, envelope: MessageEnvelope, action: F) -> DispatchOutcome
    where
        F: FnOnce(MessageEnvelope) + Send + 'static,
    {
        let score = self.analyzer.current_congestion_score();
        if score >= RAW_DISPATCH_REFUSAL_SCORE {
            warn!(score, "channel saturated, refusing raw dispatch");
            return DispatchOutcome::Refused;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return DispatchOutcome::Busy;
        }
        let guard = FlightGuard {
            gate: Arc::clone(&self.in_flight),
        };

        let delay = self.analyzer.delay_for_score(score);
        tokio::spawn(async move {
            let _guard = guard;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            action(envelope);
        });
        DispatchOutcome::Dispatched
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}
