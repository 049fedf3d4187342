//! HTTP(S) tracker announce.
//!
//! The teacher never pulls in an HTTP client crate (no `reqwest` in its
//! dependency table) — its `native-tls` dependency exists to let
//! `dtracker`'s raw socket server speak TLS. This module reuses that same
//! "write the request by hand over a socket" idiom for the client role:
//! a bare `TcpStream` for `http://` announce URLs, `native_tls::TlsStream`
//! for `https://`, grounded in `original_source/src/core/TorrentTracker.cpp`
//! for the exact query parameters and failure-reason handling.

use crate::bencode::{Bencode, BencodeError};
use crate::metainfo::TorrentFile;
use crate::tracker::response::{decode_compact_peers, CompactPeersError};
use native_tls::TlsConnector;
use std::io::{Read, Write};
use std::net::{SocketAddrV4, TcpStream};
use std::time::Duration;

#[derive(Debug)]
pub struct TrackerAnnounce {
    pub interval_secs: u64,
    pub peers: Vec<SocketAddrV4>,
}

#[derive(Debug)]
pub enum HttpTrackerError {
    InvalidAnnounceUrl(String),
    Connect(std::io::Error),
    Tls(native_tls::Error),
    Io(std::io::Error),
    MalformedHttpResponse,
    NonOkStatus(u32),
    Bencode(BencodeError),
    NotADict,
    Failure(String),
    MissingPeers,
    Peers(CompactPeersError),
}

impl From<BencodeError> for HttpTrackerError {
    fn from(err: BencodeError) -> Self {
        HttpTrackerError::Bencode(err)
    }
}

struct ParsedUrl {
    https: bool,
    host: String,
    port: u16,
    path_and_query: String,
}

fn parse_announce_url(url: &str) -> Result<ParsedUrl, HttpTrackerError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| HttpTrackerError::InvalidAnnounceUrl(url.to_string()))?;
    let https = match scheme {
        "http" => false,
        "https" => true,
        _ => return Err(HttpTrackerError::InvalidAnnounceUrl(url.to_string())),
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse()
                .map_err(|_| HttpTrackerError::InvalidAnnounceUrl(url.to_string()))?,
        ),
        None => (authority.to_string(), if https { 443 } else { 80 }),
    };

    Ok(ParsedUrl {
        https,
        host,
        port,
        path_and_query: path.to_string(),
    })
}

/// Percent-encodes raw bytes the way a tracker query string requires: every
/// byte outside `[A-Za-z0-9._~-]` becomes `%XX`.
fn percent_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'~' | b'-' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn build_request(
    parsed: &ParsedUrl,
    torrent: &TorrentFile,
    peer_id: &[u8; 20],
    port: u16,
    uploaded: u64,
    downloaded: u64,
) -> String {
    let left = torrent.length.saturating_sub(downloaded);
    let separator = if parsed.path_and_query.contains('?') {
        '&'
    } else {
        '?'
    };
    let query = format!(
        "{sep}info_hash={info_hash}&peer_id={peer_id}&port={port}&uploaded={uploaded}&downloaded={downloaded}&left={left}&compact=1",
        sep = separator,
        info_hash = percent_encode(&torrent.info_hash),
        peer_id = percent_encode(peer_id),
        port = port,
        uploaded = uploaded,
        downloaded = downloaded,
        left = left,
    );

    format!(
        "GET {path}{query} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\nAccept: */*\r\n\r\n",
        path = parsed.path_and_query,
        query = query,
        host = parsed.host,
    )
}

fn split_http_response(raw: &[u8]) -> Result<(u32, Vec<u8>), HttpTrackerError> {
    let header_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or(HttpTrackerError::MalformedHttpResponse)?;
    let header = std::str::from_utf8(&raw[..header_end])
        .map_err(|_| HttpTrackerError::MalformedHttpResponse)?;
    let status_line = header
        .lines()
        .next()
        .ok_or(HttpTrackerError::MalformedHttpResponse)?;
    let status: u32 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or(HttpTrackerError::MalformedHttpResponse)?;

    let body = raw[header_end + 4..].to_vec();
    Ok((status, body))
}

fn send_and_receive(
    parsed: &ParsedUrl,
    request: &str,
    connect_timeout: Duration,
    read_write_timeout: Duration,
) -> Result<Vec<u8>, HttpTrackerError> {
    let addr = format!("{}:{}", parsed.host, parsed.port);
    let socket_addr = std::net::ToSocketAddrs::to_socket_addrs(&addr)
        .map_err(HttpTrackerError::Connect)?
        .next()
        .ok_or_else(|| HttpTrackerError::InvalidAnnounceUrl(addr.clone()))?;

    let stream =
        TcpStream::connect_timeout(&socket_addr, connect_timeout).map_err(HttpTrackerError::Connect)?;
    stream
        .set_read_timeout(Some(read_write_timeout))
        .map_err(HttpTrackerError::Io)?;
    stream
        .set_write_timeout(Some(read_write_timeout))
        .map_err(HttpTrackerError::Io)?;

    let mut response = Vec::new();
    if parsed.https {
        let connector = TlsConnector::new().map_err(HttpTrackerError::Tls)?;
        let mut tls = connector
            .connect(&parsed.host, stream)
            .map_err(|_| HttpTrackerError::MalformedHttpResponse)?;
        tls.write_all(request.as_bytes()).map_err(HttpTrackerError::Io)?;
        tls.read_to_end(&mut response).map_err(HttpTrackerError::Io)?;
    } else {
        let mut stream = stream;
        stream
            .write_all(request.as_bytes())
            .map_err(HttpTrackerError::Io)?;
        stream.read_to_end(&mut response).map_err(HttpTrackerError::Io)?;
    }
    Ok(response)
}

fn parse_announce_body(body: &[u8]) -> Result<TrackerAnnounce, HttpTrackerError> {
    let decoded = Bencode::decode(body)?;
    let dict = decoded.as_dict().ok_or(HttpTrackerError::NotADict)?;

    if let Some(reason) = dict.get(b"failure reason".as_slice()).and_then(Bencode::as_string) {
        return Err(HttpTrackerError::Failure(
            String::from_utf8_lossy(reason).into_owned(),
        ));
    }

    let interval_secs = dict
        .get(b"interval".as_slice())
        .and_then(Bencode::as_number)
        .unwrap_or(0)
        .max(0) as u64;

    let peers_bytes = dict
        .get(b"peers".as_slice())
        .and_then(Bencode::as_string)
        .ok_or(HttpTrackerError::MissingPeers)?;
    let peers = decode_compact_peers(peers_bytes).map_err(HttpTrackerError::Peers)?;

    Ok(TrackerAnnounce {
        interval_secs,
        peers,
    })
}

/// Announces to an HTTP(S) tracker and returns the decoded peer list.
pub fn announce(
    torrent: &TorrentFile,
    peer_id: &[u8; 20],
    port: u16,
    uploaded: u64,
    downloaded: u64,
    connect_timeout: Duration,
    read_write_timeout: Duration,
) -> Result<TrackerAnnounce, HttpTrackerError> {
    let parsed = parse_announce_url(&torrent.announce)?;
    let request = build_request(&parsed, torrent, peer_id, port, uploaded, downloaded);
    let raw_response = send_and_receive(&parsed, &request, connect_timeout, read_write_timeout)?;
    let (status, body) = split_http_response(&raw_response)?;
    if status != 200 {
        return Err(HttpTrackerError::NonOkStatus(status));
    }
    parse_announce_body(&body)
}
