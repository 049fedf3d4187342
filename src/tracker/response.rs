//! Compact peer list decoding shared by the HTTP and UDP tracker clients.
//!
//! Grounded in `original_source/src/core/TorrentTracker.cpp::ParseCompactPeers`:
//! each peer is exactly 6 bytes (4-byte big-endian IPv4 + 2-byte big-endian
//! port). Unlike the teacher's `tracker_response::TrackerResponse`, which
//! also accepts a dict-style peer list, this crate only accepts the compact
//! binary form (spec.md §4.7).

use std::net::{Ipv4Addr, SocketAddrV4};

pub const COMPACT_PEER_LEN: usize = 6;

#[derive(Debug)]
pub enum CompactPeersError {
    NotAMultipleOfPeerLength(usize),
}

/// Splits a compact peer blob into `(ip, port)` pairs.
pub fn decode_compact_peers(data: &[u8]) -> Result<Vec<SocketAddrV4>, CompactPeersError> {
    if data.len() % COMPACT_PEER_LEN != 0 {
        return Err(CompactPeersError::NotAMultipleOfPeerLength(data.len()));
    }
    Ok(data
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddrV4::new(ip, port)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_two_peers() {
        let data = [127, 0, 0, 1, 0x1A, 0xE1, 10, 0, 0, 2, 0x1A, 0xE2];
        let peers = decode_compact_peers(&data).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0], SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 0x1AE1));
        assert_eq!(peers[1], SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 0x1AE2));
    }

    #[test]
    fn rejects_non_multiple_length() {
        assert!(matches!(
            decode_compact_peers(&[0u8; 7]),
            Err(CompactPeersError::NotAMultipleOfPeerLength(7))
        ));
    }

    #[test]
    fn empty_blob_decodes_to_no_peers() {
        assert_eq!(decode_compact_peers(&[]).unwrap(), Vec::new());
    }
}
