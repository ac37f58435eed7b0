//! Channel hopping under sustained interference.

use crate::clock::SharedClock;
use parking_lot::Mutex;
use tracing::info;

/// Usable channels, 1-based.
pub const CHANNEL_COUNT: u8 = 8;

/// Congestion score above which a hop is considered.
pub const HOP_SCORE_THRESHOLD: u8 = 85;

/// Minimum time between hops. Hopping splits the mesh until peers
/// re-converge, so it has to be rare.
pub const HOP_COOLDOWN_MS: u64 = 5 * 60 * 1000;

struct HopState {
    channel: u8,
    last_hop_at: Option<u64>,
}

/// Decides when interference is bad enough to abandon the current
/// channel, and which channel comes next.
pub struct FrequencyHoppingController {
    state: Mutex<HopState>,
    clock: SharedClock,
}

impl FrequencyHoppingController {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(HopState {
                channel: 1,
                last_hop_at: None,
            }),
            clock,
        }
    }

    /// Evaluate one congestion reading. Returns the new channel when a
    /// hop fires, `None` when staying put.
    pub fn maybe_hop(&self, score: u8) -> Option<u8> {
        if score <= HOP_SCORE_THRESHOLD {
            return None;
        }
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        if let Some(last) = state.last_hop_at {
            if now.saturating_sub(last) < HOP_COOLDOWN_MS {
                return None;
            }
        }
        state.channel = state.channel % CHANNEL_COUNT + 1;
        state.last_hop_at = Some(now);
        info!(score, channel = state.channel, "hopping channel");
        Some(state.channel)
    }

    pub fn current_channel(&self) -> u8 {
        self.state.lock().channel
    }
}
