//! Mesh message routing and adaptive delivery engine.
//!
//! The core turns raw transport frames into delivered payloads and
//! relay decisions, and turns radio telemetry into adaptive tuning:
//!
//! - [`message`]: envelope model and the routed-packet wire codec
//! - [`fragment`]: MTU fragmentation with XOR single-erasure FEC
//! - [`routing`]: loop-safe forwarding, packet replay/ttl enforcement,
//!   and flood relay
//! - [`congestion`] / [`telemetry`]: radio stats to a 0-100 score
//! - [`adaptive`]: score and battery to cadence, power, and channel
//! - [`qos`]: priority tiers, bounded queuing, single-flight dispatch
//!
//! [`MeshCore`] wires the pieces together for transport adapters.
//! Untrusted radio input never panics the engine: malformed frames are
//! counted and dropped.

pub mod adaptive;
pub mod clock;
pub mod congestion;
pub mod fragment;
pub mod message;
pub mod metrics;
pub mod mode;
pub mod qos;
pub mod routing;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use congestion::{MeshStateAnalyzer, MeshTelemetry};
pub use message::{MessageEnvelope, MessageType, QosLevel, BROADCAST, MAX_HOPS};
pub use metrics::{MetricCollector, MetricsSnapshot};
pub use mode::{ModeManager, OperatingMode};
pub use qos::{DispatchOutcome, RuntimeMetrics};
pub use routing::{ForwardingDecision, RouteDecision, RouteSink};

use fragment::{Assembler, Fragment, FragmentError, Fragmenter};
use qos::{DispatchScheduler, PriorityMessageQueue, QosController};
use rand::Rng;
use routing::{ForwardingEngine, PacketRouter, RoutingEngine};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error(transparent)]
    Codec(#[from] message::CodecError),

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error("envelope serialization failed: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// One frame as handed up by a transport adapter. Transports know
/// which port/characteristic a frame arrived on, so they tag the kind;
/// the two binary layouts are otherwise ambiguous.
#[derive(Debug, Clone, Copy)]
pub enum InboundFrame<'a> {
    Packet(&'a [u8]),
    Fragment(&'a [u8]),
}

/// What the transport should do with a frame after the core processed
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Dropped, consumed locally, or stored for reassembly; nothing to
    /// transmit.
    Handled,
    /// Retransmit these restamped packet bytes to reachable peers.
    Forward(Vec<u8>),
}

/// The assembled engine: owns every routing-path component and exposes
/// the inbound/outbound entry points transports and schedulers use.
pub struct MeshCore {
    local_node_id: String,
    clock: SharedClock,
    metrics: Arc<MetricCollector>,
    forwarding: ForwardingEngine,
    packet_router: PacketRouter,
    routing: RoutingEngine,
    assembler: Assembler,
    fragmenter: Fragmenter,
    analyzer: Arc<MeshStateAnalyzer>,
    qos: QosController,
    outbound: PriorityMessageQueue,
    scheduler: DispatchScheduler,
    sink: Arc<dyn RouteSink>,
}

/// Outbound queue capacity used by [`MeshCore::new`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

impl MeshCore {
    pub fn new(local_node_id: impl Into<String>, sink: Arc<dyn RouteSink>) -> Self {
        Self::with_clock(local_node_id, sink, Arc::new(SystemClock))
    }

    /// Build with an injected clock, used by tests to drive expiry
    /// deterministically.
    pub fn with_clock(
        local_node_id: impl Into<String>,
        sink: Arc<dyn RouteSink>,
        clock: SharedClock,
    ) -> Self {
        let local_node_id = local_node_id.into();
        let metrics = Arc::new(MetricCollector::new());
        let analyzer = Arc::new(MeshStateAnalyzer::new());
        Self {
            forwarding: ForwardingEngine::new(
                local_node_id.clone(),
                Arc::clone(&clock),
                Arc::clone(&metrics),
            ),
            packet_router: PacketRouter::new(local_node_id.clone(), Arc::clone(&metrics)),
            routing: RoutingEngine::new(local_node_id.clone(), Arc::clone(&clock)),
            assembler: Assembler::new(Arc::clone(&clock), Arc::clone(&metrics)),
            fragmenter: Fragmenter::default(),
            qos: QosController::new(),
            outbound: PriorityMessageQueue::new(DEFAULT_QUEUE_CAPACITY),
            scheduler: DispatchScheduler::new(Arc::clone(&analyzer), Arc::clone(&metrics)),
            local_node_id,
            clock,
            metrics,
            analyzer,
            sink,
        }
    }

    pub fn local_node_id(&self) -> &str {
        &self.local_node_id
    }

    /// Process one transport frame.
    ///
    /// Fragments are fed to the assembler; a completed reassembly
    /// yields routed-packet bytes that re-enter the packet path.
    /// Malformed frames are counted and dropped, never an error.
    pub fn handle_inbound_frame(&self, frame: InboundFrame<'_>) -> FrameOutcome {
        match frame {
            InboundFrame::Fragment(bytes) => match Fragment::decode(bytes) {
                Ok(fragment) => match self.assembler.on_fragment_received(fragment) {
                    Some(payload) => self.handle_packet(&payload),
                    None => FrameOutcome::Handled,
                },
                Err(_) => {
                    self.metrics.incr_invalid_packets();
                    FrameOutcome::Handled
                }
            },
            InboundFrame::Packet(bytes) => self.handle_packet(bytes),
        }
    }

    fn handle_packet(&self, bytes: &[u8]) -> FrameOutcome {
        match self.packet_router.on_receive_packet(bytes) {
            RouteDecision::Consume => {
                self.consume_packet(bytes);
                FrameOutcome::Handled
            }
            RouteDecision::Forward => {
                FrameOutcome::Forward(self.packet_router.prepare_for_forwarding(bytes))
            }
            RouteDecision::DropDuplicate
            | RouteDecision::DropExpired
            | RouteDecision::DropInvalid => FrameOutcome::Handled,
        }
    }

    /// Consume a packet addressed to this node (or broadcast): decode
    /// the envelope, run the loop check, then route to the sink.
    fn consume_packet(&self, bytes: &[u8]) {
        let packet = match message::RoutedPacket::decode(bytes) {
            Ok(p) => p,
            Err(_) => {
                self.metrics.incr_invalid_packets();
                return;
            }
        };
        let envelope: MessageEnvelope = match serde_json::from_slice(&packet.payload) {
            Ok(e) => e,
            Err(err) => {
                self.metrics.incr_invalid_packets();
                debug!(packet_id = packet.packet_id, %err, "undecodable envelope payload");
                return;
            }
        };

        if self.forwarding.on_message_received(&envelope) == ForwardingDecision::AcceptAndForward {
            self.routing.process_incoming(&envelope, self.sink.as_ref());
        }
    }

    /// Encode an envelope into transmit-ready frames: one routed
    /// packet, fragmented when it exceeds the MTU.
    pub fn prepare_outbound(&self, envelope: &MessageEnvelope) -> Result<Vec<Vec<u8>>, MeshError> {
        let payload = serde_json::to_vec(envelope)?;
        let packet_id = rand::thread_rng().gen::<u64>();
        let packet = message::RoutedPacket {
            packet_id,
            ttl: envelope.ttl,
            hop_count: envelope.hop_count,
            source_id: envelope.sender_id.clone(),
            target_id: envelope.target_id.clone(),
            payload,
        }
        .encode()?;

        if packet.len() <= self.fragmenter.mtu() {
            return Ok(vec![packet]);
        }

        let mut fragments = self.fragmenter.fragment(packet_id, &packet)?;
        if let Some(parity) = fragment::fec::generate_parity(&fragments) {
            fragments.push(parity);
        }
        Ok(fragments.iter().map(Fragment::encode).collect())
    }

    /// Dispatch an outbound envelope through QoS policy. `action`
    /// receives the priority-stamped envelope after the computed delay.
    pub fn dispatch<F>(
        &self,
        envelope: MessageEnvelope,
        runtime: &RuntimeMetrics,
        action: F,
    ) -> DispatchOutcome
    where
        F: FnOnce(MessageEnvelope) + Send + 'static,
    {
        self.scheduler.dispatch(envelope, runtime, action)
    }

    /// Congestion-only dispatch for traffic outside QoS (beacons,
    /// raw relays).
    pub fn dispatch_raw<F>(&self, envelope: MessageEnvelope, action: F) -> DispatchOutcome
    where
        F: FnOnce(MessageEnvelope) + Send + 'static,
    {
        self.scheduler.dispatch_raw(envelope, action)
    }

    /// Stamp an envelope's priority under current conditions and park
    /// it in the bounded outbound queue. Returns false when the queue
    /// is full and the envelope did not outrank the current minimum.
    pub fn enqueue_outbound(&self, envelope: MessageEnvelope, runtime: &RuntimeMetrics) -> bool {
        let priority = self.qos.calculate_priority(envelope.message_type, runtime);
        self.outbound.enqueue(envelope.with_priority(priority))
    }

    /// Highest-priority queued envelope, if any.
    pub fn next_outbound(&self) -> Option<MessageEnvelope> {
        self.outbound.dequeue()
    }

    /// Outbound queue fill fraction, fed back into telemetry.
    pub fn queue_pressure(&self) -> f32 {
        self.outbound.pressure()
    }

    pub fn queue_depth(&self) -> usize {
        self.outbound.len()
    }

    /// Shared congestion estimator, fed by the telemetry loop.
    pub fn analyzer(&self) -> Arc<MeshStateAnalyzer> {
        Arc::clone(&self.analyzer)
    }

    pub fn congestion_score(&self) -> u8 {
        self.analyzer.current_congestion_score()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Periodic maintenance: expire seen-cache entries. Assembly
    /// sessions expire on fragment arrival; this covers the caches
    /// that otherwise only grow.
    pub fn prune(&self) {
        self.forwarding.prune_expired();
    }

    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }
}
