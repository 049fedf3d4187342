//! A single peer connection: handshake, bitfield exchange, and the
//! single-block-in-flight download loop.
//!
//! Grounded in `original_source/src/net/PeerConnect.cpp`: `Run()` becomes
//! `PeerSession::run`'s outer retry loop, `EstablishConnection` becomes
//! `connect_and_prepare`, and `MainLoop`/`ProcessMessage` become
//! `main_loop`/`handle_message` below, translated from exceptions into
//! `Result` propagation per this crate's error-handling idiom.

use crate::config::Cfg;
use crate::logger::LoggerSender;
use crate::piece::Piece;
use crate::storage::{PieceStorage, StorageError};
use crate::wire::bitfield::Bitfield;
use crate::wire::handshake::{Handshake, HandshakeError};
use crate::wire::message::{Message, MessageError};
use crate::peer::socket::{PeerSocket, PeerSocketError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Caps how many queued pieces a session will skip over looking for one the
/// peer actually has, mirroring `GetNextAvailablePiece`'s bounded search.
const MAX_PIECE_SEARCH_ATTEMPTS: u32 = 100;

#[derive(Debug)]
pub enum PeerSessionError {
    Connect(PeerSocketError),
    Handshake(HandshakeError),
    Socket(PeerSocketError),
    Message(MessageError),
    Inactive,
    /// A piece failed to persist to disk. Fatal per spec.md §7: unlike every
    /// other variant here, this is not retried by `run` — it is returned
    /// immediately so the swarm driver can abort the whole download.
    Storage(StorageError),
}

impl From<PeerSocketError> for PeerSessionError {
    fn from(err: PeerSocketError) -> Self {
        PeerSessionError::Socket(err)
    }
}

pub struct PeerSession {
    socket: PeerSocket,
    addr: SocketAddr,
    peer_bitfield: Bitfield,
    choked: bool,
    piece_count: u32,
}

impl PeerSession {
    /// Runs the full retry-wrapped session against `addr`: connect,
    /// handshake, exchange bitfield, then download pieces from `storage`
    /// until it is drained or the peer has no more useful pieces. Retries
    /// up to `cfg.session_retry_attempts` times with linear backoff on
    /// transport failure (spec.md §4.5, §8.3).
    ///
    /// `terminate` is the swarm-wide cooperative cancellation flag (spec.md
    /// §5): checked at the head of the retry loop and of the main loop, so a
    /// stall-detecting supervisor can cut a whole generation of sessions
    /// short instead of waiting out every session's own retry budget.
    ///
    /// Transport and protocol failures are retried up to `max_attempts`
    /// and then given up on silently, same as ever. A `Storage` error is
    /// different: it means a piece could not be persisted to disk, which is
    /// fatal to the whole download (spec.md §7), so it is returned
    /// immediately instead of being retried, letting the swarm driver abort.
    pub fn run(
        addr: SocketAddr,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        piece_count: u32,
        storage: &PieceStorage,
        cfg: &Cfg,
        logger: &LoggerSender,
        terminate: &AtomicBool,
    ) -> Result<(), StorageError> {
        let max_attempts = cfg.session_retry_attempts.max(1);
        for attempt in 1..=max_attempts {
            if terminate.load(Ordering::SeqCst) {
                let _ = logger.info(&format!("session with {} terminated before attempt {}", addr, attempt));
                return Ok(());
            }
            match Self::connect_and_prepare(addr, info_hash, peer_id, piece_count, cfg) {
                Ok(mut session) => {
                    let _ = logger.info(&format!("connected to {}", addr));
                    match session.main_loop(storage, cfg, logger, terminate) {
                        Ok(()) => {
                            let _ = logger.info(&format!("session with {} finished", addr));
                            return Ok(());
                        }
                        Err(PeerSessionError::Storage(err)) => {
                            let _ = logger.error(&format!(
                                "session with {} hit a fatal storage error: {:?}",
                                addr, err
                            ));
                            return Err(err);
                        }
                        Err(err) => {
                            let _ = logger.warn(&format!(
                                "session with {} failed on attempt {}: {:?}",
                                addr, attempt, err
                            ));
                        }
                    }
                }
                Err(err) => {
                    let _ = logger.warn(&format!(
                        "connect to {} failed on attempt {}: {:?}",
                        addr, attempt, err
                    ));
                }
            }

            if attempt < max_attempts {
                thread::sleep(Duration::from_secs(2 * attempt as u64));
            }
        }
        let _ = logger.error(&format!(
            "giving up on {} after {} attempts",
            addr, max_attempts
        ));
        Ok(())
    }

    fn connect_and_prepare(
        addr: SocketAddr,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        piece_count: u32,
        cfg: &Cfg,
    ) -> Result<PeerSession, PeerSessionError> {
        let mut socket = PeerSocket::connect(addr, cfg.connect_timeout, cfg.read_write_timeout)
            .map_err(PeerSessionError::Connect)?;

        let handshake = Handshake::new(info_hash, peer_id);
        socket.send_bytes(&handshake.encode())?;
        let response = socket.receive_exact(crate::wire::handshake::HANDSHAKE_LEN)?;
        Handshake::decode(&response, &info_hash).map_err(PeerSessionError::Handshake)?;

        let mut session = PeerSession {
            socket,
            addr,
            peer_bitfield: Bitfield::new(piece_count),
            choked: true,
            piece_count,
        };

        // Mirrors PerformHandshake -> ReceiveBitfield -> SendInterested:
        // exactly one message is consulted before announcing interest.
        if let Ok(payload) = session.socket.receive_frame() {
            if let Ok(message) = Message::decode(&payload) {
                session.apply_message(message, None, None);
            }
        }

        session
            .socket
            .send_bytes(&Message::Interested.encode())?;
        Ok(session)
    }

    fn main_loop(
        &mut self,
        storage: &PieceStorage,
        cfg: &Cfg,
        logger: &LoggerSender,
        terminate: &AtomicBool,
    ) -> Result<(), PeerSessionError> {
        let mut last_activity = Instant::now();
        let mut piece_in_progress: Option<Piece> = None;
        let mut block_pending = false;

        loop {
            if terminate.load(Ordering::SeqCst) {
                if let Some(piece) = piece_in_progress.take() {
                    Self::requeue_in_progress(storage, piece);
                }
                let _ = logger.info(&format!("session with {} terminated", self.addr));
                return Ok(());
            }

            if last_activity.elapsed() > cfg.inactivity_timeout {
                if let Some(piece) = piece_in_progress.take() {
                    Self::requeue_in_progress(storage, piece);
                }
                return Err(PeerSessionError::Inactive);
            }

            if piece_in_progress.is_none() {
                piece_in_progress = self.next_available_piece(storage);
                if piece_in_progress.is_none() {
                    if storage.queue_is_empty() {
                        return Ok(());
                    }
                    thread::sleep(Duration::from_millis(100));
                    continue;
                }
            }

            if !self.choked && !block_pending {
                let request = piece_in_progress
                    .as_mut()
                    .and_then(|piece| piece.first_missing_block())
                    .map(|block| Message::Request {
                        index: block.piece_index,
                        begin: block.offset_in_piece,
                        length: block.length,
                    });
                if let Some(request) = request {
                    if let Err(err) = self.socket.send_bytes(&request.encode()) {
                        Self::requeue_in_progress(storage, piece_in_progress.take().unwrap());
                        return Err(err.into());
                    }
                    block_pending = true;
                    last_activity = Instant::now();
                }
            }

            let payload = match self.socket.receive_frame() {
                Ok(payload) => payload,
                Err(err) => {
                    if let Some(piece) = piece_in_progress.take() {
                        Self::requeue_in_progress(storage, piece);
                    }
                    return Err(err.into());
                }
            };
            let message = match Message::decode(&payload) {
                Ok(message) => message,
                Err(err) => {
                    if let Some(piece) = piece_in_progress.take() {
                        Self::requeue_in_progress(storage, piece);
                    }
                    return Err(PeerSessionError::Message(err));
                }
            };
            last_activity = Instant::now();

            let finished = self.apply_message(message, piece_in_progress.as_mut(), Some(&mut block_pending));
            if finished {
                if let Some(piece) = piece_in_progress.take() {
                    storage.piece_processed(piece).map_err(PeerSessionError::Storage)?;
                    let _ = logger.info(&format!(
                        "piece from {} saved ({}/{})",
                        self.addr,
                        storage.saved_count(),
                        storage.total_count()
                    ));
                }
                block_pending = false;
            }
        }
    }

    /// Returns a piece this session was still working on back to `storage`.
    /// Releases its dangling `Pending` block first, so the one request this
    /// session never got an answer for doesn't permanently block the next
    /// session from completing it.
    fn requeue_in_progress(storage: &PieceStorage, mut piece: Piece) {
        piece.release_pending_blocks();
        storage.requeue(piece);
    }

    /// Repeatedly pulls from `storage` until it finds a piece this peer's
    /// bitfield claims to have, requeuing the ones it skips
    /// (`GetNextAvailablePiece` in `PeerConnect.cpp`).
    fn next_available_piece(&self, storage: &PieceStorage) -> Option<Piece> {
        for _ in 0..MAX_PIECE_SEARCH_ATTEMPTS {
            let piece = storage.next_piece()?;
            if self.peer_bitfield.has_piece(piece.index) {
                return Some(piece);
            }
            storage.requeue(piece);
        }
        None
    }

    /// Applies one decoded message to session state. Returns `true` when
    /// applying it completed the in-progress piece's blocks.
    fn apply_message(
        &mut self,
        message: Message,
        piece_in_progress: Option<&mut Piece>,
        block_pending: Option<&mut bool>,
    ) -> bool {
        match message {
            Message::Choke => {
                self.choked = true;
                if let Some(pending) = block_pending {
                    *pending = false;
                }
                false
            }
            Message::Unchoke => {
                self.choked = false;
                false
            }
            Message::Have { piece_index } => {
                self.peer_bitfield.set_piece(piece_index);
                false
            }
            Message::Bitfield { bits } => {
                self.peer_bitfield = Bitfield::from_payload(bits, self.piece_count);
                false
            }
            Message::Piece { index, begin, data } => {
                if let Some(piece) = piece_in_progress {
                    if piece.index == index {
                        piece.save_block(begin, &data);
                        if let Some(pending) = block_pending {
                            *pending = false;
                        }
                        return piece.all_received();
                    }
                }
                false
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::TorrentFile;
    use std::net::TcpListener;

    fn build_torrent(data: &[u8], piece_length: u32) -> TorrentFile {
        let piece_hashes = data
            .chunks(piece_length as usize)
            .map(crate::byte_tools::sha1)
            .collect::<Vec<_>>();
        TorrentFile {
            announce: "http://tracker.test/".to_string(),
            name: "out.bin".to_string(),
            length: data.len() as u64,
            piece_length,
            piece_hashes,
            info_hash: [7u8; 20],
        }
    }

    /// Runs a full handshake/bitfield/unchoke/request/piece exchange
    /// against a minimal mock peer over loopback TCP, verifying the piece
    /// ends up saved to disk (spec.md §8.1: single-peer, single-piece
    /// round trip).
    #[test]
    fn downloads_single_piece_from_mock_peer() {
        let data = vec![b'Z'; 16384];
        let torrent = build_torrent(&data, 16384);
        let dir = std::env::temp_dir().join(format!(
            "bitleech-session-test-{:?}",
            thread::current().id()
        ));
        let storage = PieceStorage::new(&torrent, &dir).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let info_hash = torrent.info_hash;
        let piece_data = data.clone();

        let mock = thread::spawn(move || {
            use std::io::{Read, Write};
            let (mut stream, _) = listener.accept().unwrap();

            let mut handshake_buf = [0u8; 68];
            stream.read_exact(&mut handshake_buf).unwrap();
            let response = Handshake::new(info_hash, [9u8; 20]).encode();
            stream.write_all(&response).unwrap();

            // advertise piece 0 so `next_available_piece` will pick it up,
            // then unchoke once the connection is past the handshake.
            stream
                .write_all(&Message::Bitfield { bits: vec![0x80] }.encode())
                .unwrap();
            stream.write_all(&Message::Unchoke.encode()).unwrap();

            let mut length_buf = [0u8; 4];
            stream.read_exact(&mut length_buf).unwrap();
            let len = u32::from_be_bytes(length_buf);
            let mut payload = vec![0u8; len as usize];
            stream.read_exact(&mut payload).unwrap();
            assert_eq!(payload[0], 2); // interested

            let mut length_buf = [0u8; 4];
            stream.read_exact(&mut length_buf).unwrap();
            let len = u32::from_be_bytes(length_buf);
            let mut payload = vec![0u8; len as usize];
            stream.read_exact(&mut payload).unwrap();
            assert_eq!(payload[0], 6); // request

            let piece_msg = Message::Piece {
                index: 0,
                begin: 0,
                data: piece_data,
            };
            stream.write_all(&piece_msg.encode()).unwrap();

            // keep connection open briefly so the session sees EOF cleanly
            thread::sleep(Duration::from_millis(50));
        });

        let cfg = Cfg {
            connect_timeout: Duration::from_secs(1),
            read_write_timeout: Duration::from_millis(500),
            ..Cfg::default()
        };
        let logger_dir = std::env::temp_dir().join(format!(
            "bitleech-session-log-{:?}",
            thread::current().id()
        ));
        let logger = crate::logger::Logger::new(&logger_dir).unwrap();

        let terminate = std::sync::atomic::AtomicBool::new(false);
        PeerSession::run(
            addr,
            info_hash,
            [1u8; 20],
            torrent.total_pieces(),
            &storage,
            &cfg,
            &logger.new_sender(),
            &terminate,
        )
        .unwrap();

        assert_eq!(storage.saved_count(), 1);
        mock.join().unwrap();

        storage.close().unwrap();
        std::fs::remove_dir_all(&dir).ok();
        std::fs::remove_dir_all(&logger_dir).ok();
    }
}
