//! Adaptive control: congestion score, operating mode, and battery
//! level drive broadcast cadence, transmit power, and channel hops.

pub mod controller;
pub mod hopping;
pub mod power;

pub use controller::{AdaptiveMeshController, MeshTuning, EPOCH_CEILING, EPOCH_FLOOR};
pub use hopping::{FrequencyHoppingController, CHANNEL_COUNT, HOP_COOLDOWN_MS, HOP_SCORE_THRESHOLD};
pub use power::{AdaptivePowerManager, PowerProfile};
