//! Congestion sensing: a sliding window of radio telemetry collapsed
//! into a single 0-100 score that the adaptive and QoS layers consume.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::trace;

/// Samples kept in the moving-average window.
pub const TELEMETRY_WINDOW: usize = 5;

/// One telemetry tick's worth of radio state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshTelemetry {
    pub peer_count: u32,
    /// Fraction of sent packets that went unacknowledged, 0-1.
    pub packet_collision_rate: f32,
    /// Raw dBm, typically -100 (quiet) to -40 (saturated).
    pub noise_floor: i32,
    /// Outbound queue fill fraction, 0-1.
    pub queue_pressure: f32,
}

/// Read-mostly congestion estimator. The telemetry tick task is the
/// only writer; routing and scheduling paths read the score.
pub struct MeshStateAnalyzer {
    window: RwLock<VecDeque<MeshTelemetry>>,
}

impl MeshStateAnalyzer {
    pub fn new() -> Self {
        Self {
            window: RwLock::new(VecDeque::with_capacity(TELEMETRY_WINDOW)),
        }
    }

    /// Push one sample, evicting the oldest once the window is full.
    pub fn record_sample(&self, sample: MeshTelemetry) {
        let mut window = self.window.write();
        if window.len() == TELEMETRY_WINDOW {
            window.pop_front();
        }
        window.push_back(sample);
        trace!(?sample, window_len = window.len(), "telemetry sample recorded");
    }

    /// Moving-average congestion score in [0, 100]. An empty window
    /// (node just started, radio silent) reads as uncongested.
    pub fn current_congestion_score(&self) -> u8 {
        let window = self.window.read();
        if window.is_empty() {
            return 0;
        }

        let n = window.len() as f32;
        let avg_collision = window.iter().map(|s| s.packet_collision_rate).sum::<f32>() / n;
        let avg_peers = window.iter().map(|s| s.peer_count as f32).sum::<f32>() / n;
        let avg_noise = window.iter().map(|s| s.noise_floor as f32).sum::<f32>() / n;
        let avg_queue = window.iter().map(|s| s.queue_pressure).sum::<f32>() / n;

        // -100 dBm maps to 0 badness, -40 dBm to 1.
        let signal_badness = ((avg_noise + 100.0) / 60.0).clamp(0.0, 1.0);
        let score = avg_collision * 35.0
            + (avg_peers / 40.0).min(1.0) * 20.0
            + avg_queue * 15.0
            + signal_badness * 30.0;

        score.clamp(0.0, 100.0) as u8
    }

    /// Coarse deterministic backoff curve. Step bands keep the same
    /// inputs producing the same delay on every node in the mesh.
    pub fn delay_for_score(&self, score: u8) -> Duration {
        let ms = match score {
            0..=19 => 0,
            20..=39 => 500,
            40..=59 => 1500,
            60..=79 => 3000,
            _ => 6000,
        };
        Duration::from_millis(ms)
    }

    /// Backoff for the current window in one call.
    pub fn current_delay(&self) -> Duration {
        self.delay_for_score(self.current_congestion_score())
    }
}

impl Default for MeshStateAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(peers: u32, collision: f32, noise: i32, queue: f32) -> MeshTelemetry {
        MeshTelemetry {
            peer_count: peers,
            packet_collision_rate: collision,
            noise_floor: noise,
            queue_pressure: queue,
        }
    }

    #[test]
    fn test_empty_window_scores_zero() {
        let analyzer = MeshStateAnalyzer::new();
        assert_eq!(analyzer.current_congestion_score(), 0);
    }

    #[test]
    fn test_reference_scenario_scores_forty() {
        // 0.5*35 + (10/40)*20 + 0.2*15 + ((-70+100)/60)*30 = 40.5 -> 40
        let analyzer = MeshStateAnalyzer::new();
        analyzer.record_sample(sample(10, 0.5, -70, 0.2));
        let score = analyzer.current_congestion_score();
        assert_eq!(score, 40);
        assert_eq!(analyzer.delay_for_score(score), Duration::from_millis(1500));
    }

    #[test]
    fn test_quiet_mesh_scores_low() {
        let analyzer = MeshStateAnalyzer::new();
        analyzer.record_sample(sample(2, 0.0, -100, 0.0));
        assert!(analyzer.current_congestion_score() < 20);
    }

    #[test]
    fn test_saturated_mesh_clamps_to_hundred() {
        let analyzer = MeshStateAnalyzer::new();
        analyzer.record_sample(sample(200, 1.0, -10, 1.0));
        assert_eq!(analyzer.current_congestion_score(), 100);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let analyzer = MeshStateAnalyzer::new();
        // One saturated sample followed by a full window of quiet ones.
        analyzer.record_sample(sample(200, 1.0, -10, 1.0));
        for _ in 0..TELEMETRY_WINDOW {
            analyzer.record_sample(sample(0, 0.0, -100, 0.0));
        }
        assert_eq!(analyzer.current_congestion_score(), 0);
    }

    #[test]
    fn test_delay_band_edges() {
        let analyzer = MeshStateAnalyzer::new();
        assert_eq!(analyzer.delay_for_score(0), Duration::ZERO);
        assert_eq!(analyzer.delay_for_score(19), Duration::ZERO);
        assert_eq!(analyzer.delay_for_score(20), Duration::from_millis(500));
        assert_eq!(analyzer.delay_for_score(40), Duration::from_millis(1500));
        assert_eq!(analyzer.delay_for_score(60), Duration::from_millis(3000));
        assert_eq!(analyzer.delay_for_score(80), Duration::from_millis(6000));
        assert_eq!(analyzer.delay_for_score(100), Duration::from_millis(6000));
    }
}
