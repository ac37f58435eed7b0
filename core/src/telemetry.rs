//! Radio telemetry ingestion: turns raw counters and RSSI readings
//! into `MeshTelemetry` samples on a fixed tick, independent of
//! message traffic.

use crate::congestion::{MeshStateAnalyzer, MeshTelemetry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Interval between telemetry samples.
pub const TELEMETRY_TICK: Duration = Duration::from_secs(10);

/// Noise floor reported when the radio has no recent RSSI samples.
const QUIET_NOISE_FLOOR_DBM: i32 = -100;

/// Capability the radio layer exposes to the core. Counters are
/// cumulative since radio start.
#[cfg_attr(test, mockall::automock)]
pub trait RadioStatsProvider: Send + Sync {
    fn sent_packets(&self) -> u64;
    fn acked_packets(&self) -> u64;
    fn recent_rssi_samples(&self) -> Vec<i32>;
}

/// Build one telemetry sample from the radio's current counters.
///
/// Collision rate is approximated as the unacked fraction of sent
/// packets; with nothing sent yet it reads as zero, not NaN.
pub fn sample_telemetry(
    provider: &dyn RadioStatsProvider,
    peer_count: u32,
    queue_pressure: f32,
) -> MeshTelemetry {
    let sent = provider.sent_packets();
    let acked = provider.acked_packets();
    let collision_rate = if sent == 0 {
        0.0
    } else {
        (1.0 - acked as f32 / sent as f32).clamp(0.0, 1.0)
    };

    let rssi = provider.recent_rssi_samples();
    let noise_floor = if rssi.is_empty() {
        QUIET_NOISE_FLOOR_DBM
    } else {
        rssi.iter().sum::<i32>() / rssi.len() as i32
    };

    MeshTelemetry {
        peer_count,
        packet_collision_rate: collision_rate,
        noise_floor,
        queue_pressure: queue_pressure.clamp(0.0, 1.0),
    }
}

/// Periodic sampling task. `mesh_status` reports the current
/// `(peer_count, queue_pressure)` pair at each tick.
///
/// Runs until the returned task handle is aborted.
pub fn run_telemetry_loop<F>(
    provider: Arc<dyn RadioStatsProvider>,
    analyzer: Arc<MeshStateAnalyzer>,
    mesh_status: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn() -> (u32, f32) + Send + 'static,
{
    tokio::spawn(async move {
        info!(interval = ?TELEMETRY_TICK, "telemetry loop started");
        let mut ticker = tokio::time::interval(TELEMETRY_TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let (peer_count, queue_pressure) = mesh_status();
            let sample = sample_telemetry(provider.as_ref(), peer_count, queue_pressure);
            analyzer.record_sample(sample);
            debug!(
                score = analyzer.current_congestion_score(),
                peer_count, "telemetry tick"
            );
        }
    })
}
