//! BEP-15 UDP tracker protocol (connect + announce), over a blocking
//! `UdpSocket`.
//!
//! Grounded in `examples/0xNathanW-bitter/bittorrent/src/tracker/udp.rs`'s
//! async implementation, rewritten for blocking I/O to match this crate's
//! thread-per-session architecture (spec.md §5).

use crate::metainfo::TorrentFile;
use rand::random;
use std::net::{SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::time::Duration;

const PROTOCOL_ID: i64 = 0x41727101980;
const ACTION_CONNECT: i32 = 0;
const ACTION_ANNOUNCE: i32 = 1;
const ACTION_ERROR: i32 = 3;

/// Static, well-known UDP trackers used when a torrent's own announce URL
/// is unreachable or not itself `udp://` (spec.md §4.7 requires a fallback
/// list; its contents are left to the implementation).
pub const FALLBACK_TRACKERS: &[&str] = &[
    "tracker.opentrackr.org:1337",
    "open.demonii.com:1337",
    "tracker.openbittorrent.com:80",
    "exodus.desync.com:6969",
];

#[derive(Debug)]
pub struct UdpAnnounce {
    pub interval_secs: u64,
    pub peers: Vec<SocketAddrV4>,
}

#[derive(Debug)]
pub enum UdpTrackerError {
    InvalidAnnounceUrl(String),
    Resolve(std::io::Error),
    Io(std::io::Error),
    ShortResponse(usize),
    WrongAction(i32),
    WrongTransactionId,
    TrackerError(String),
}

fn parse_udp_url(url: &str) -> Result<String, UdpTrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| UdpTrackerError::InvalidAnnounceUrl(url.to_string()))?;
    let authority = rest.split('/').next().unwrap_or(rest);
    Ok(authority.to_string())
}

/// Builds the 16-byte connect datagram for a given transaction id (BEP-15
/// §"Connect"), split out from `connect` so the exact wire layout is
/// independently testable (spec.md §8, scenario 6).
fn build_connect_request(transaction_id: i32) -> Vec<u8> {
    let mut request = Vec::with_capacity(16);
    request.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
    request.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
    request.extend_from_slice(&transaction_id.to_be_bytes());
    request
}

fn connect(socket: &UdpSocket) -> Result<i64, UdpTrackerError> {
    let transaction_id: i32 = random();
    let request = build_connect_request(transaction_id);
    socket.send(&request).map_err(UdpTrackerError::Io)?;

    let mut response = [0u8; 16];
    let n = socket.recv(&mut response).map_err(UdpTrackerError::Io)?;
    if n < 16 {
        return Err(UdpTrackerError::ShortResponse(n));
    }

    let action = i32::from_be_bytes(response[0..4].try_into().unwrap());
    let received_transaction_id = i32::from_be_bytes(response[4..8].try_into().unwrap());
    if action == ACTION_ERROR {
        return Err(UdpTrackerError::TrackerError(
            "tracker rejected connect".to_string(),
        ));
    }
    if action != ACTION_CONNECT {
        return Err(UdpTrackerError::WrongAction(action));
    }
    if received_transaction_id != transaction_id {
        return Err(UdpTrackerError::WrongTransactionId);
    }

    Ok(i64::from_be_bytes(response[8..16].try_into().unwrap()))
}

fn announce_with_connection_id(
    socket: &UdpSocket,
    connection_id: i64,
    torrent: &TorrentFile,
    peer_id: &[u8; 20],
    port: u16,
    uploaded: u64,
    downloaded: u64,
) -> Result<UdpAnnounce, UdpTrackerError> {
    let transaction_id: i32 = random();
    let left = torrent.length.saturating_sub(downloaded);

    let mut request = Vec::with_capacity(98);
    request.extend_from_slice(&connection_id.to_be_bytes());
    request.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
    request.extend_from_slice(&transaction_id.to_be_bytes());
    request.extend_from_slice(&torrent.info_hash);
    request.extend_from_slice(peer_id);
    request.extend_from_slice(&downloaded.to_be_bytes());
    request.extend_from_slice(&left.to_be_bytes());
    request.extend_from_slice(&uploaded.to_be_bytes());
    request.extend_from_slice(&2i32.to_be_bytes()); // event: started
    request.extend_from_slice(&0u32.to_be_bytes()); // ip: default
    request.extend_from_slice(&random::<u32>().to_be_bytes()); // key
    request.extend_from_slice(&(-1i32).to_be_bytes()); // num_want: default
    request.extend_from_slice(&port.to_be_bytes());

    socket.send(&request).map_err(UdpTrackerError::Io)?;

    let mut response = [0u8; 1024];
    let n = socket.recv(&mut response).map_err(UdpTrackerError::Io)?;
    if n < 20 {
        return Err(UdpTrackerError::ShortResponse(n));
    }

    let action = i32::from_be_bytes(response[0..4].try_into().unwrap());
    let received_transaction_id = i32::from_be_bytes(response[4..8].try_into().unwrap());
    if action == ACTION_ERROR {
        return Err(UdpTrackerError::TrackerError(
            "tracker rejected announce".to_string(),
        ));
    }
    if action != ACTION_ANNOUNCE {
        return Err(UdpTrackerError::WrongAction(action));
    }
    if received_transaction_id != transaction_id {
        return Err(UdpTrackerError::WrongTransactionId);
    }

    let interval_secs = u32::from_be_bytes(response[8..12].try_into().unwrap()) as u64;
    let peers = response[20..n]
        .chunks_exact(6)
        .map(|chunk| {
            let ip = std::net::Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddrV4::new(ip, port)
        })
        .collect();

    Ok(UdpAnnounce {
        interval_secs,
        peers,
    })
}

/// Announces to a single `udp://host:port` tracker.
pub fn announce(
    announce_url: &str,
    torrent: &TorrentFile,
    peer_id: &[u8; 20],
    port: u16,
    uploaded: u64,
    downloaded: u64,
    timeout: Duration,
) -> Result<UdpAnnounce, UdpTrackerError> {
    let authority = parse_udp_url(announce_url)?;
    let addr = authority
        .to_socket_addrs()
        .map_err(UdpTrackerError::Resolve)?
        .next()
        .ok_or_else(|| UdpTrackerError::InvalidAnnounceUrl(announce_url.to_string()))?;

    let socket = UdpSocket::bind("0.0.0.0:0").map_err(UdpTrackerError::Io)?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(UdpTrackerError::Io)?;
    socket.connect(addr).map_err(UdpTrackerError::Io)?;

    let connection_id = connect(&socket)?;
    announce_with_connection_id(
        &socket,
        connection_id,
        torrent,
        peer_id,
        port,
        uploaded,
        downloaded,
    )
}

/// Tries `announce_url` first (if it is a `udp://` URL), then each static
/// fallback tracker in order, returning the first successful announce.
pub fn announce_with_fallback(
    announce_url: &str,
    torrent: &TorrentFile,
    peer_id: &[u8; 20],
    port: u16,
    uploaded: u64,
    downloaded: u64,
    timeout: Duration,
) -> Result<UdpAnnounce, UdpTrackerError> {
    let mut candidates: Vec<String> = Vec::new();
    if announce_url.starts_with("udp://") {
        candidates.push(announce_url.to_string());
    }
    candidates.extend(FALLBACK_TRACKERS.iter().map(|host| format!("udp://{}", host)));

    let mut last_err = UdpTrackerError::InvalidAnnounceUrl(announce_url.to_string());
    for candidate in candidates {
        match announce(&candidate, torrent, peer_id, port, uploaded, downloaded, timeout) {
            Ok(result) => return Ok(result),
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}
