//! Three routing layers: envelope forwarding decisions, raw packet
//! routing, and local-delivery-plus-relay flood semantics.

pub mod engine;
pub mod forwarding;
pub mod packet;

pub use engine::{RouteSink, RoutingEngine, ROUTE_SEEN_EXPIRY_MS};
pub use forwarding::{
    ForwardingDecision, ForwardingEngine, SEEN_CACHE_CAPACITY, SEEN_CACHE_MAX_AGE_MS,
};
pub use packet::{build_packet, PacketRouter, RouteDecision, REPLAY_SET_CAPACITY};
