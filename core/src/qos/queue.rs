//! Bounded max-priority-first message queue.

use crate::message::MessageEnvelope;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

/// Ordered by `(priority, Reverse(arrival))`: the map's last entry is
/// the highest priority, oldest-first within a tier.
type QueueKey = (u32, Reverse<u64>);

struct QueueState {
    entries: BTreeMap<QueueKey, MessageEnvelope>,
    next_seq: u64,
}

/// Bounded priority queue for outbound envelopes.
///
/// Once full, a new envelope only gets in by displacing the current
/// minimum, and only when its priority is strictly higher. After any
/// enqueue sequence the queue holds the `max_size` highest-priority
/// survivors.
pub struct PriorityMessageQueue {
    max_size: usize,
    state: Mutex<QueueState>,
}

impl PriorityMessageQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            state: Mutex::new(QueueState {
                entries: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Returns false when the envelope was rejected (queue full and
    /// priority not strictly above the current minimum).
    pub fn enqueue(&self, envelope: MessageEnvelope) -> bool {
        let mut state = self.state.lock();

        if state.entries.len() >= self.max_size {
            let min_priority = match state.entries.keys().next() {
                Some(&(p, _)) => p,
                None => return false, // max_size == 0
            };
            if envelope.calculated_priority <= min_priority {
                debug!(
                    message_id = %envelope.id,
                    priority = envelope.calculated_priority,
                    "queue full, envelope rejected"
                );
                return false;
            }
            let evicted = state.entries.keys().next().copied();
            if let Some(key) = evicted {
                state.entries.remove(&key);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .entries
            .insert((envelope.calculated_priority, Reverse(seq)), envelope);
        true
    }

    /// Highest priority out first; FIFO within a priority tier.
    pub fn dequeue(&self) -> Option<MessageEnvelope> {
        let mut state = self.state.lock();
        let key = state.entries.keys().next_back().copied()?;
        state.entries.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Queue fill fraction for telemetry.
    pub fn pressure(&self) -> f32 {
        if self.max_size == 0 {
            return 1.0;
        }
        self.len() as f32 / self.max_size as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn envelope(priority: u32, payload: u8) -> MessageEnvelope {
        MessageEnvelope::new("s", "t", vec![payload], MessageType::Text, 5, 0)
            .with_priority(priority)
    }

    #[test]
    fn test_highest_priority_first() {
        let q = PriorityMessageQueue::new(10);
        q.enqueue(envelope(10, 1));
        q.enqueue(envelope(100, 2));
        q.enqueue(envelope(50, 3));

        assert_eq!(q.dequeue().unwrap().payload, vec![2]);
        assert_eq!(q.dequeue().unwrap().payload, vec![3]);
        assert_eq!(q.dequeue().unwrap().payload, vec![1]);
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn test_fifo_within_equal_priority() {
        let q = PriorityMessageQueue::new(10);
        for p in [1u8, 2, 3] {
            q.enqueue(envelope(50, p));
        }
        assert_eq!(q.dequeue().unwrap().payload, vec![1]);
        assert_eq!(q.dequeue().unwrap().payload, vec![2]);
        assert_eq!(q.dequeue().unwrap().payload, vec![3]);
    }

    #[test]
    fn test_never_exceeds_max_size() {
        let q = PriorityMessageQueue::new(3);
        for i in 0..20u32 {
            q.enqueue(envelope(i, i as u8));
            assert!(q.len() <= 3);
        }
        // Highest-priority survivors remain.
        assert_eq!(q.dequeue().unwrap().calculated_priority, 19);
        assert_eq!(q.dequeue().unwrap().calculated_priority, 18);
        assert_eq!(q.dequeue().unwrap().calculated_priority, 17);
    }

    #[test]
    fn test_equal_priority_rejected_when_full() {
        let q = PriorityMessageQueue::new(2);
        assert!(q.enqueue(envelope(50, 1)));
        assert!(q.enqueue(envelope(50, 2)));
        // Equal priority does not displace; strictly higher does.
        assert!(!q.enqueue(envelope(50, 3)));
        assert!(q.enqueue(envelope(51, 4)));
        assert_eq!(q.len(), 2);
        assert_eq!(q.dequeue().unwrap().payload, vec![4]);
    }

    #[test]
    fn test_pressure() {
        let q = PriorityMessageQueue::new(4);
        assert_eq!(q.pressure(), 0.0);
        q.enqueue(envelope(10, 1));
        q.enqueue(envelope(10, 2));
        assert!((q.pressure() - 0.5).abs() < f32::EPSILON);
    }
}
