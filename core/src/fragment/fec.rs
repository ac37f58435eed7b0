//! XOR single-erasure parity.
//!
//! The parity body carries a 2-byte XOR of the chunk lengths followed
//! by the byte-wise XOR of every chunk zero-padded to the longest one.
//! That makes recovery of the one missing chunk exact to its original
//! length, including a short final chunk. This is a single-erasure
//! code: with two or more chunks missing the message is unrecoverable
//! and the assembly session simply ages out.

use super::fragmenter::Fragment;

/// Bytes of length bookkeeping at the front of the parity body.
const PARITY_LEN_PREFIX: usize = 2;

/// Build the parity chunk for a fragmented message.
///
/// Returns `None` for an empty fragment list.
pub fn generate_parity(fragments: &[Fragment]) -> Option<Fragment> {
    let first = fragments.first()?;
    let max_len = fragments.iter().map(|f| f.data.len()).max().unwrap_or(0);

    let mut body = vec![0u8; PARITY_LEN_PREFIX + max_len];
    let mut len_xor = 0u16;

    for fragment in fragments {
        len_xor ^= fragment.data.len() as u16;
        for (i, byte) in fragment.data.iter().enumerate() {
            body[PARITY_LEN_PREFIX + i] ^= byte;
        }
    }
    body[..PARITY_LEN_PREFIX].copy_from_slice(&len_xor.to_be_bytes());

    Some(Fragment::new_parity(
        first.message_id,
        first.total_chunks,
        body,
    ))
}

/// Recover the single missing chunk from the parity body and every
/// chunk that did arrive.
///
/// Returns `None` when the parity body is malformed or the recovered
/// length is impossible.
pub fn recover<'a, I>(present: I, parity_body: &[u8]) -> Option<Vec<u8>>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    if parity_body.len() < PARITY_LEN_PREFIX {
        return None;
    }

    let mut len = u16::from_be_bytes([parity_body[0], parity_body[1]]);
    let mut buf = parity_body[PARITY_LEN_PREFIX..].to_vec();

    for chunk in present {
        len ^= chunk.len() as u16;
        for (i, byte) in chunk.iter().enumerate() {
            // A chunk longer than the parity body means the inputs do
            // not belong together.
            *buf.get_mut(i)? ^= byte;
        }
    }

    let len = len as usize;
    if len > buf.len() {
        return None;
    }
    buf.truncate(len);
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragmenter;

    fn fragments_for(payload: &[u8]) -> Vec<Fragment> {
        Fragmenter::new(64).fragment(42, payload).unwrap()
    }

    #[test]
    fn test_parity_of_empty_list() {
        assert!(generate_parity(&[]).is_none());
    }

    #[test]
    fn test_recover_each_possible_loss() {
        // 120 bytes at mtu 64 -> 3 chunks of 47/47/26 bytes.
        let payload: Vec<u8> = (0u8..120).collect();
        let fragments = fragments_for(&payload);
        assert_eq!(fragments.len(), 3);

        let parity = generate_parity(&fragments).unwrap();

        for missing in 0..fragments.len() {
            let present: Vec<&[u8]> = fragments
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != missing)
                .map(|(_, f)| f.data.as_slice())
                .collect();

            let recovered = recover(present, &parity.data).unwrap();
            assert_eq!(recovered, fragments[missing].data, "missing chunk {missing}");
        }
    }

    #[test]
    fn test_short_last_chunk_recovered_exactly() {
        let payload: Vec<u8> = (0u8..100).collect();
        let fragments = fragments_for(&payload);
        let last = fragments.len() - 1;
        assert!(fragments[last].data.len() < fragments[0].data.len());

        let parity = generate_parity(&fragments).unwrap();
        let present: Vec<&[u8]> = fragments[..last].iter().map(|f| f.data.as_slice()).collect();

        let recovered = recover(present, &parity.data).unwrap();
        assert_eq!(recovered.len(), fragments[last].data.len());
        assert_eq!(recovered, fragments[last].data);
    }

    #[test]
    fn test_payload_ending_in_zeros_is_bit_exact() {
        let mut payload = vec![7u8; 90];
        payload.extend_from_slice(&[0u8; 10]);
        let fragments = fragments_for(&payload);
        let last = fragments.len() - 1;

        let parity = generate_parity(&fragments).unwrap();
        let present: Vec<&[u8]> = fragments[..last].iter().map(|f| f.data.as_slice()).collect();

        let recovered = recover(present, &parity.data).unwrap();
        assert_eq!(recovered, fragments[last].data);
    }

    #[test]
    fn test_single_chunk_message() {
        let fragments = fragments_for(b"tiny");
        assert_eq!(fragments.len(), 1);

        let parity = generate_parity(&fragments).unwrap();
        let recovered = recover(std::iter::empty::<&[u8]>(), &parity.data).unwrap();
        assert_eq!(recovered, b"tiny");
    }

    #[test]
    fn test_malformed_parity_body() {
        assert!(recover(std::iter::empty::<&[u8]>(), &[0u8; 1]).is_none());
    }

    #[test]
    fn test_oversized_present_chunk_rejected() {
        let fragments = fragments_for(b"abcdef");
        let parity = generate_parity(&fragments).unwrap();

        let oversized = vec![0u8; parity.data.len() + 16];
        assert!(recover([oversized.as_slice()], &parity.data).is_none());
    }
}
