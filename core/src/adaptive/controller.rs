//! Score- and mode-driven radio tuning.
//!
//! Every mapping here is a pure function of `(score, mode, previous
//! epoch)`; the controller only carries the epoch feedback term.

use crate::mode::OperatingMode;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

/// Shortest allowed epoch under sustained congestion.
pub const EPOCH_FLOOR: Duration = Duration::from_millis(500);

/// Longest allowed epoch under sustained calm.
pub const EPOCH_CEILING: Duration = Duration::from_millis(5000);

const INITIAL_EPOCH: Duration = Duration::from_millis(2000);

/// One retune's worth of radio settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshTuning {
    pub broadcast_interval: Duration,
    pub epoch: Duration,
    /// 0 = lowest transmit power, 2 = highest.
    pub tx_power_tier: u8,
}

/// Beacon cadence table. Emergency mode reacts in finer steps because
/// latency matters more than battery there.
pub fn broadcast_interval_for(score: u8, mode: OperatingMode) -> Duration {
    let secs = match mode {
        OperatingMode::Emergency => match score {
            0..=14 => 3,
            15..=39 => 7,
            40..=69 => 15,
            _ => 30,
        },
        OperatingMode::Daily => match score {
            0..=29 => 10,
            30..=59 => 20,
            _ => 60,
        },
    };
    Duration::from_secs(secs)
}

/// Sparse, quiet meshes get reach; crowded ones get collision
/// avoidance.
pub fn tx_power_tier_for(score: u8) -> u8 {
    match score {
        0..=9 => 2,
        10..=49 => 1,
        _ => 0,
    }
}

/// Epoch feedback step. Emergency shrinks under congestion and grows
/// under calm; daily only ever grows.
pub fn next_epoch(previous: Duration, score: u8, mode: OperatingMode) -> Duration {
    let step = match mode {
        OperatingMode::Emergency if score > 70 => {
            previous.saturating_sub(Duration::from_millis(800))
        }
        OperatingMode::Emergency if score < 30 => previous + Duration::from_millis(1000),
        OperatingMode::Emergency => previous,
        OperatingMode::Daily => previous + Duration::from_millis(500),
    };
    step.clamp(EPOCH_FLOOR, EPOCH_CEILING)
}

/// Stateful wrapper carrying the epoch between retunes.
pub struct AdaptiveMeshController {
    epoch: Mutex<Duration>,
}

impl AdaptiveMeshController {
    pub fn new() -> Self {
        Self {
            epoch: Mutex::new(INITIAL_EPOCH),
        }
    }

    pub fn retune(&self, score: u8, mode: OperatingMode) -> MeshTuning {
        let mut epoch = self.epoch.lock();
        *epoch = next_epoch(*epoch, score, mode);
        let tuning = MeshTuning {
            broadcast_interval: broadcast_interval_for(score, mode),
            epoch: *epoch,
            tx_power_tier: tx_power_tier_for(score),
        };
        debug!(score, %mode, ?tuning, "retuned");
        tuning
    }

    pub fn current_epoch(&self) -> Duration {
        *self.epoch.lock()
    }
}

impl Default for AdaptiveMeshController {
    fn default() -> Self {
        Self::new()
    }
}
