//! Operating mode for the whole node.
//!
//! Daily mode favors battery over latency; emergency mode reacts faster
//! and allows the QoS layer to throttle bulk traffic aggressively.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Infrastructure is reachable; conserve resources.
    Daily,
    /// Offline/disaster operation; latency wins over battery.
    Emergency,
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatingMode::Daily => write!(f, "daily"),
            OperatingMode::Emergency => write!(f, "emergency"),
        }
    }
}

type ModeListener = Box<dyn Fn(OperatingMode, OperatingMode) + Send + Sync>;

/// Holds the current mode and notifies listeners on change only.
pub struct ModeManager {
    mode: RwLock<OperatingMode>,
    listeners: RwLock<Vec<ModeListener>>,
}

impl ModeManager {
    pub fn new(initial: OperatingMode) -> Self {
        Self {
            mode: RwLock::new(initial),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn current_mode(&self) -> OperatingMode {
        *self.mode.read()
    }

    /// Switch modes. Listeners fire only on an actual transition.
    pub fn set_mode(&self, new_mode: OperatingMode) {
        let old_mode = {
            let mut guard = self.mode.write();
            let old = *guard;
            if old == new_mode {
                return;
            }
            *guard = new_mode;
            old
        };

        info!(from = %old_mode, to = %new_mode, "operating mode changed");
        for listener in self.listeners.read().iter() {
            listener(new_mode, old_mode);
        }
    }

    pub fn on_mode_change<F>(&self, listener: F)
    where
        F: Fn(OperatingMode, OperatingMode) + Send + Sync + 'static,
    {
        self.listeners.write().push(Box::new(listener));
    }
}

impl Default for ModeManager {
    fn default() -> Self {
        Self::new(OperatingMode::Daily)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_is_daily() {
        let manager = ModeManager::default();
        assert_eq!(manager.current_mode(), OperatingMode::Daily);
    }

    #[test]
    fn test_switch_notifies_once() {
        let manager = ModeManager::default();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        manager.on_mode_change(move |new, old| {
            assert_eq!(new, OperatingMode::Emergency);
            assert_eq!(old, OperatingMode::Daily);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.set_mode(OperatingMode::Emergency);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(manager.current_mode(), OperatingMode::Emergency);
    }

    #[test]
    fn test_same_mode_does_not_notify() {
        let manager = ModeManager::default();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        manager.on_mode_change(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.set_mode(OperatingMode::Daily);
        manager.set_mode(OperatingMode::Daily);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
