//! Tracker announce: dispatches on the torrent's announce URL scheme to the
//! HTTP(S) or UDP client, normalizing both into one `Announce` result.

pub mod http;
pub mod response;
pub mod udp;

use crate::metainfo::TorrentFile;
use std::net::SocketAddrV4;
use std::time::Duration;

#[derive(Debug)]
pub struct Announce {
    pub interval_secs: u64,
    pub peers: Vec<SocketAddrV4>,
}

#[derive(Debug)]
pub enum TrackerError {
    UnsupportedScheme(String),
    Http(http::HttpTrackerError),
    Udp(udp::UdpTrackerError),
}

/// Announces to `torrent`'s tracker, picking HTTP(S) or UDP transport from
/// the announce URL's scheme (spec.md §4.7). `udp://` URLs fall back to the
/// static tracker list on failure; `http(s)://` URLs do not, since compact
/// HTTP tracker failures are usually semantic (bad request) rather than
/// connectivity issues.
pub fn announce(
    torrent: &TorrentFile,
    peer_id: &[u8; 20],
    port: u16,
    uploaded: u64,
    downloaded: u64,
    connect_timeout: Duration,
    read_write_timeout: Duration,
) -> Result<Announce, TrackerError> {
    match torrent.announce_scheme() {
        "http" | "https" => {
            let result = http::announce(
                torrent,
                peer_id,
                port,
                uploaded,
                downloaded,
                connect_timeout,
                read_write_timeout,
            )
            .map_err(TrackerError::Http)?;
            Ok(Announce {
                interval_secs: result.interval_secs,
                peers: result.peers,
            })
        }
        "udp" => {
            let result = udp::announce_with_fallback(
                &torrent.announce,
                torrent,
                peer_id,
                port,
                uploaded,
                downloaded,
                read_write_timeout,
            )
            .map_err(TrackerError::Udp)?;
            Ok(Announce {
                interval_secs: result.interval_secs,
                peers: result.peers,
            })
        }
        other => Err(TrackerError::UnsupportedScheme(other.to_string())),
    }
}
