//! Loop-safe store-and-forward decisions.
//!
//! The seen-message cache is the primary anti-storm guarantee in a
//! broadcast mesh with no spanning tree: a message id is accepted for
//! forwarding at most once per node, no matter how many transports
//! deliver duplicates in parallel.

use crate::clock::SharedClock;
use crate::message::MessageEnvelope;
use crate::metrics::MetricCollector;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Default capacity of the seen-message cache.
pub const SEEN_CACHE_CAPACITY: usize = 10_000;

/// Entries unseen for this long expire regardless of cache volume.
pub const SEEN_CACHE_MAX_AGE_MS: u64 = 5 * 60 * 1000;

/// Deterministic forwarding outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingDecision {
    AcceptAndForward,
    /// Already processed by this node.
    DropLoop,
    /// Ttl exhausted; normal end-of-life, not an error.
    DropExpired,
}

struct SeenEntry {
    last_seen: u64,
    stamp: u64,
}

/// Bounded LRU set of message ids with age expiry.
///
/// Recency is tracked with a lazy stamp queue: every touch pushes a new
/// `(id, stamp)` pair and outdated pairs are skipped during eviction,
/// keeping membership and insertion O(1) amortized.
struct SeenCache {
    capacity: usize,
    max_age_ms: u64,
    entries: HashMap<String, SeenEntry>,
    order: VecDeque<(String, u64)>,
    next_stamp: u64,
}

impl SeenCache {
    fn new(capacity: usize, max_age_ms: u64) -> Self {
        Self {
            capacity,
            max_age_ms,
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_stamp: 0,
        }
    }

    /// Membership test plus insertion in one step. Returns true when
    /// the id was already present (and not aged out).
    fn check_and_insert(&mut self, id: &str, now: u64) -> bool {
        self.next_stamp += 1;
        let stamp = self.next_stamp;

        if let Some(entry) = self.entries.get_mut(id) {
            let fresh = now.saturating_sub(entry.last_seen) <= self.max_age_ms;
            entry.last_seen = now;
            entry.stamp = stamp;
            self.order.push_back((id.to_string(), stamp));
            self.compact_order();
            return fresh;
        }

        self.entries.insert(
            id.to_string(),
            SeenEntry {
                last_seen: now,
                stamp,
            },
        );
        self.order.push_back((id.to_string(), stamp));

        while self.entries.len() > self.capacity {
            self.evict_lru();
        }
        self.compact_order();
        false
    }

    /// Duplicate storms re-stamp existing entries without evicting, so
    /// the stamp queue can outgrow the entry map. Drop dead pairs once
    /// the queue holds more stale stamps than live ones.
    fn compact_order(&mut self) {
        if self.order.len() <= self.capacity.saturating_mul(2) {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(id, stamp)| entries.get(id).map(|e| e.stamp == *stamp).unwrap_or(false));
    }

    /// Remove the least-recently-used live entry.
    fn evict_lru(&mut self) {
        while let Some((id, stamp)) = self.order.pop_front() {
            let live = self
                .entries
                .get(&id)
                .map(|e| e.stamp == stamp)
                .unwrap_or(false);
            if live {
                self.entries.remove(&id);
                return;
            }
        }
    }

    /// Drop every entry older than the cutoff.
    fn prune_older_than(&mut self, now: u64) {
        let max_age = self.max_age_ms;
        self.entries
            .retain(|_, e| now.saturating_sub(e.last_seen) <= max_age);
        let entries = &self.entries;
        self.order
            .retain(|(id, stamp)| entries.get(id).map(|e| e.stamp == *stamp).unwrap_or(false));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Loop-safe store-and-forward engine.
pub struct ForwardingEngine {
    local_node_id: String,
    seen: Mutex<SeenCache>,
    clock: SharedClock,
    metrics: Arc<MetricCollector>,
}

impl ForwardingEngine {
    pub fn new(
        local_node_id: impl Into<String>,
        clock: SharedClock,
        metrics: Arc<MetricCollector>,
    ) -> Self {
        Self::with_capacity(local_node_id, SEEN_CACHE_CAPACITY, clock, metrics)
    }

    pub fn with_capacity(
        local_node_id: impl Into<String>,
        capacity: usize,
        clock: SharedClock,
        metrics: Arc<MetricCollector>,
    ) -> Self {
        Self {
            local_node_id: local_node_id.into(),
            seen: Mutex::new(SeenCache::new(capacity, SEEN_CACHE_MAX_AGE_MS)),
            clock,
            metrics,
        }
    }

    /// Entry point for incoming envelopes from any transport.
    ///
    /// The seen-cache check and insert happen under one lock, so two
    /// transports delivering the same message in parallel can never
    /// both get `AcceptAndForward`.
    pub fn on_message_received(&self, envelope: &MessageEnvelope) -> ForwardingDecision {
        let now = self.clock.now_millis();
        let already_seen = self.seen.lock().check_and_insert(&envelope.id, now);

        if already_seen {
            self.metrics.incr_loop_drops();
            debug!(message_id = %envelope.id, "loop detected, dropping");
            return ForwardingDecision::DropLoop;
        }

        if envelope.is_expired() {
            self.metrics.incr_expired_drops();
            return ForwardingDecision::DropExpired;
        }

        ForwardingDecision::AcceptAndForward
    }

    /// Per-peer gate evaluated at transmit time: never reflect a
    /// message back to its previous hop, never send to ourselves.
    pub fn should_forward_to_peer(&self, envelope: &MessageEnvelope, peer_node_id: &str) -> bool {
        peer_node_id != envelope.last_hop_node_id && peer_node_id != self.local_node_id
    }

    /// Periodic maintenance hook: drop aged-out ids.
    pub fn prune_expired(&self) {
        self.seen.lock().prune_older_than(self.clock.now_millis());
    }

    /// Current number of tracked ids (diagnostics).
    pub fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }
}
