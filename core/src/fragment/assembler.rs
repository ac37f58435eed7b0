//! Reassembly of fragmented messages, with single-loss FEC recovery.

use super::fec;
use super::fragmenter::Fragment;
use crate::clock::SharedClock;
use crate::metrics::MetricCollector;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Sessions older than this are purged on every fragment arrival.
const SESSION_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// In-progress reassembly for one message id.
struct AssemblySession {
    total_chunks: u16,
    fragments: HashMap<u16, Vec<u8>>,
    parity: Option<Vec<u8>>,
    started_at: u64,
}

impl AssemblySession {
    fn new(total_chunks: u16, now: u64) -> Self {
        Self {
            total_chunks,
            fragments: HashMap::new(),
            parity: None,
            started_at: now,
        }
    }
}

/// Merges fragments back into payloads.
///
/// Fragments arrive asynchronously and are merged opportunistically by
/// explicit chunk index, never arrival order. At most one session per
/// in-flight message id exists at a time; memory is bounded by the
/// 5-minute session timeout swept on every arrival.
pub struct Assembler {
    sessions: Mutex<HashMap<u64, AssemblySession>>,
    clock: SharedClock,
    metrics: Arc<MetricCollector>,
}

impl Assembler {
    pub fn new(clock: SharedClock, metrics: Arc<MetricCollector>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
            metrics,
        }
    }

    /// Feed one received fragment. Returns the reassembled payload once
    /// all chunks are present, or once exactly one is missing and the
    /// parity chunk fills the gap.
    ///
    /// Corrupt (CRC-failed) and nonsensical fragments are counted and
    /// dropped; untrusted radio input never raises an error here.
    pub fn on_fragment_received(&self, fragment: Fragment) -> Option<Vec<u8>> {
        self.metrics.incr_total_fragments();

        if !fragment.crc_ok() {
            self.metrics.incr_corrupt_fragments();
            debug!(message_id = fragment.message_id, "fragment dropped: bad crc");
            return None;
        }
        if fragment.total_chunks == 0
            || (!fragment.is_fec && fragment.chunk_index >= fragment.total_chunks)
        {
            self.metrics.incr_corrupt_fragments();
            debug!(message_id = fragment.message_id, "fragment dropped: bad header");
            return None;
        }

        let now = self.clock.now_millis();
        let mut sessions = self.sessions.lock();

        // Amortized sweep keeps memory bounded by the live sessions.
        sessions.retain(|_, s| now.saturating_sub(s.started_at) <= SESSION_TIMEOUT_MS);

        let session = sessions
            .entry(fragment.message_id)
            .or_insert_with(|| AssemblySession::new(fragment.total_chunks, now));
        if session.total_chunks != fragment.total_chunks {
            // Conflicting header for the same id; trust the first.
            self.metrics.incr_corrupt_fragments();
            return None;
        }

        if fragment.is_fec {
            session.parity = Some(fragment.data);
        } else {
            session.fragments.insert(fragment.chunk_index, fragment.data);
        }

        let total = session.total_chunks;
        let held = session.fragments.len() as u16;

        if held == total {
            let session = sessions.remove(&fragment.message_id)?;
            return finalize(fragment.message_id, session);
        }

        if held == total - 1 && session.parity.is_some() {
            let mut session = sessions.remove(&fragment.message_id)?;
            let missing = (0..total).find(|i| !session.fragments.contains_key(i))?;
            let present = session.fragments.values().map(Vec::as_slice);
            let recovered = fec::recover(present, session.parity.as_deref()?)?;

            info!(
                message_id = fragment.message_id,
                chunk = missing,
                "fec recovery filled missing chunk"
            );
            self.metrics.incr_fec_recovery();
            session.fragments.insert(missing, recovered);
            return finalize(fragment.message_id, session);
        }

        None
    }

    /// Number of in-flight sessions (diagnostics).
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

fn finalize(message_id: u64, mut session: AssemblySession) -> Option<Vec<u8>> {
    let mut payload = Vec::new();
    for index in 0..session.total_chunks {
        payload.extend_from_slice(&session.fragments.remove(&index)?);
    }
    debug!(message_id, bytes = payload.len(), "message reassembled");
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fragment::{fec, Fragmenter};

    fn make_assembler() -> (Assembler, Arc<ManualClock>, Arc<MetricCollector>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let metrics = Arc::new(MetricCollector::new());
        let assembler = Assembler::new(clock.clone(), metrics.clone());
        (assembler, clock, metrics)
    }

    fn split(payload: &[u8]) -> Vec<Fragment> {
        Fragmenter::new(64).fragment(99, payload).unwrap()
    }

    #[test]
    fn test_in_order_reassembly() {
        let (assembler, _, _) = make_assembler();
        let payload: Vec<u8> = (0u8..120).collect();
        let fragments = split(&payload);

        let mut result = None;
        for fragment in fragments {
            result = assembler.on_fragment_received(fragment);
        }
        assert_eq!(result.unwrap(), payload);
        assert_eq!(assembler.active_sessions(), 0);
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let (assembler, _, _) = make_assembler();
        let payload: Vec<u8> = (0u8..120).collect();
        let mut fragments = split(&payload);
        fragments.reverse();

        let mut result = None;
        for fragment in fragments {
            result = assembler.on_fragment_received(fragment);
        }
        assert_eq!(result.unwrap(), payload);
    }

    #[test]
    fn test_fec_recovery_of_withheld_chunk() {
        let (assembler, _, metrics) = make_assembler();
        let payload: Vec<u8> = (0u8..120).collect();
        let fragments = split(&payload);
        let parity = fec::generate_parity(&fragments).unwrap();

        // Withhold chunk 1; deliver parity instead.
        let mut result = None;
        for fragment in fragments
            .into_iter()
            .filter(|f| f.chunk_index != 1)
            .chain(std::iter::once(parity))
        {
            result = assembler.on_fragment_received(fragment);
        }

        assert_eq!(result.unwrap(), payload);
        assert_eq!(metrics.snapshot().fec_recovery_count, 1);
    }

    #[test]
    fn test_parity_first_then_data() {
        let (assembler, _, _) = make_assembler();
        let payload: Vec<u8> = (0u8..120).collect();
        let fragments = split(&payload);
        let parity = fec::generate_parity(&fragments).unwrap();

        let mut result = assembler.on_fragment_received(parity);
        assert!(result.is_none());
        for fragment in fragments.into_iter().filter(|f| f.chunk_index != 2) {
            result = assembler.on_fragment_received(fragment);
        }
        assert_eq!(result.unwrap(), payload);
    }

    #[test]
    fn test_two_missing_chunks_never_complete() {
        let (assembler, _, _) = make_assembler();
        let payload: Vec<u8> = (0u8..200).collect();
        let fragments = split(&payload);
        assert!(fragments.len() >= 4);
        let parity = fec::generate_parity(&fragments).unwrap();

        let mut result = None;
        for fragment in fragments
            .into_iter()
            .filter(|f| f.chunk_index > 1)
            .chain(std::iter::once(parity))
        {
            result = assembler.on_fragment_received(fragment);
        }
        assert!(result.is_none());
        assert_eq!(assembler.active_sessions(), 1);
    }

    #[test]
    fn test_corrupt_fragment_counted_and_dropped() {
        let (assembler, _, metrics) = make_assembler();
        let mut fragment = Fragment::new_data(1, 2, 0, b"data".to_vec());
        fragment.data[0] ^= 0xFF;

        assert!(assembler.on_fragment_received(fragment).is_none());
        let snap = metrics.snapshot();
        assert_eq!(snap.corrupt_fragments, 1);
        assert_eq!(snap.total_fragments, 1);
        assert_eq!(assembler.active_sessions(), 0);
    }

    #[test]
    fn test_session_timeout_purges_stale_state() {
        let (assembler, clock, _) = make_assembler();
        let payload: Vec<u8> = (0u8..120).collect();
        let fragments = split(&payload);

        assembler.on_fragment_received(fragments[0].clone());
        assert_eq!(assembler.active_sessions(), 1);

        clock.advance(SESSION_TIMEOUT_MS + 1);

        // The next arrival sweeps the stale session, then starts fresh.
        assembler.on_fragment_received(fragments[1].clone());
        assert_eq!(assembler.active_sessions(), 1);

        // Chunk 0 was lost with the purged session, so completion now
        // needs it again.
        let result = assembler.on_fragment_received(fragments[2].clone());
        assert!(result.is_none());
        let result = assembler.on_fragment_received(fragments[0].clone());
        assert_eq!(result.unwrap(), payload);
    }

    #[test]
    fn test_duplicate_fragment_is_idempotent() {
        let (assembler, _, _) = make_assembler();
        let payload: Vec<u8> = (0u8..120).collect();
        let fragments = split(&payload);

        assembler.on_fragment_received(fragments[0].clone());
        assembler.on_fragment_received(fragments[0].clone());
        assembler.on_fragment_received(fragments[1].clone());
        let result = assembler.on_fragment_received(fragments[2].clone());
        assert_eq!(result.unwrap(), payload);
    }

    #[test]
    fn test_bad_chunk_index_dropped() {
        let (assembler, _, metrics) = make_assembler();
        let fragment = Fragment::new_data(5, 2, 7, b"stray".to_vec());

        assert!(assembler.on_fragment_received(fragment).is_none());
        assert_eq!(metrics.snapshot().corrupt_fragments, 1);
    }
}
