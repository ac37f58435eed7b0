//! Battery-driven power profile selection.

use parking_lot::Mutex;
use std::fmt;
use tracing::info;

/// Coarse radio duty profile derived from battery level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerProfile {
    /// Battery >= 50%: full relay participation.
    Aggressive,
    /// Battery 20-50%: normal participation.
    Normal,
    /// Battery < 20%: minimum duty, critical traffic only.
    LowPower,
}

impl PowerProfile {
    pub fn for_battery_level(percent: u8) -> Self {
        match percent {
            50..=100 => PowerProfile::Aggressive,
            20..=49 => PowerProfile::Normal,
            _ => PowerProfile::LowPower,
        }
    }
}

impl fmt::Display for PowerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerProfile::Aggressive => "aggressive",
            PowerProfile::Normal => "normal",
            PowerProfile::LowPower => "low-power",
        };
        f.write_str(s)
    }
}

type ProfileCallback = Box<dyn Fn(PowerProfile) + Send + Sync>;

/// Tracks battery readings and notifies only when the mapped profile
/// actually changes; battery telemetry is noisy and per-reading
/// callbacks would storm subscribers.
pub struct AdaptivePowerManager {
    current: Mutex<PowerProfile>,
    on_change: ProfileCallback,
}

impl AdaptivePowerManager {
    pub fn new<F>(initial_battery: u8, on_change: F) -> Self
    where
        F: Fn(PowerProfile) + Send + Sync + 'static,
    {
        Self {
            current: Mutex::new(PowerProfile::for_battery_level(initial_battery)),
            on_change: Box::new(on_change),
        }
    }

    /// Feed one battery reading. Returns the profile now in effect.
    pub fn on_battery_level(&self, percent: u8) -> PowerProfile {
        let next = PowerProfile::for_battery_level(percent);
        let mut current = self.current.lock();
        if next != *current {
            info!(battery = percent, from = %current, to = %next, "power profile changed");
            *current = next;
            (self.on_change)(next);
        }
        next
    }

    pub fn current_profile(&self) -> PowerProfile {
        *self.current.lock()
    }
}
