//! `SwarmDriver`: spawns one worker thread per peer, supervises overall
//! progress, detects stalls, and retries against the tracker until the
//! torrent is complete.
//!
//! Grounded in `original_source/src/core/TorrentClient.cpp`:
//! `RunDownloadMultithread` becomes `run_swarm_once` (one supervisor pass
//! over a fixed peer set from a single tracker announce) and
//! `DownloadFromTracker` becomes `SwarmDriver::run` (the outer tracker
//! retry loop). Per-peer retry lives inside `peer::session::PeerSession::run`
//! instead of being duplicated here, since spec.md §4.5/§8.3 places it
//! there.

use crate::config::Cfg;
use crate::logger::LoggerSender;
use crate::metainfo::TorrentFile;
use crate::peer::session::PeerSession;
use crate::storage::{PieceStorage, StorageError};
use crate::tracker::{self, TrackerError};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

const TRACKER_INCOMPLETE_PAUSE: Duration = Duration::from_secs(15);

#[derive(Debug)]
pub enum SwarmError {
    Storage(StorageError),
    TrackerGaveUp,
}

impl From<StorageError> for SwarmError {
    fn from(err: StorageError) -> Self {
        SwarmError::Storage(err)
    }
}

pub struct SwarmDriver {
    peer_id: [u8; 20],
    cfg: Cfg,
    logger: LoggerSender,
}

impl SwarmDriver {
    pub fn new(peer_id: [u8; 20], cfg: Cfg, logger: LoggerSender) -> SwarmDriver {
        SwarmDriver {
            peer_id,
            cfg,
            logger,
        }
    }

    /// Downloads the whole torrent to `output_dir`, retrying the tracker
    /// announce until the storage reports complete or the attempt cap is
    /// hit (spec.md §4.6, §4.7's "outer loop retries tracker + swarm").
    pub fn run(&self, torrent: &TorrentFile, output_dir: &Path) -> Result<(), SwarmError> {
        let storage = PieceStorage::new(torrent, output_dir)?;
        let max_tracker_attempts = self.cfg.tracker_retry_attempts.max(1);

        let mut tracker_attempts = 0;
        while !storage.is_complete() {
            tracker_attempts += 1;
            let _ = self
                .logger
                .info(&format!("tracker attempt {}", tracker_attempts));

            let announce = tracker::announce(
                torrent,
                &self.peer_id,
                self.cfg.tcp_port,
                0,
                0,
                self.cfg.connect_timeout,
                self.cfg.read_write_timeout,
            );

            let peers = match announce {
                Ok(result) => result.peers,
                Err(err) => {
                    let _ = self.logger.warn(&format!("tracker error: {:?}", err));
                    if tracker_attempts >= max_tracker_attempts {
                        return Err(SwarmError::TrackerGaveUp);
                    }
                    thread::sleep(self.cfg.tracker_retry_pause);
                    continue;
                }
            };

            if peers.is_empty() {
                let _ = self.logger.warn("tracker returned no peers, retrying");
                thread::sleep(self.cfg.tracker_retry_pause);
                continue;
            }
            let peers: Vec<_> = peers.into_iter().take(self.cfg.max_peers).collect();
            let _ = self.logger.info(&format!("found {} peers", peers.len()));

            let is_final_attempt = tracker_attempts >= max_tracker_attempts;
            if let Some(err) = self.run_swarm_once(&peers, torrent, &storage, is_final_attempt) {
                return Err(SwarmError::from(err));
            }

            if !storage.is_complete() {
                if is_final_attempt {
                    return Err(SwarmError::TrackerGaveUp);
                }
                thread::sleep(TRACKER_INCOMPLETE_PAUSE);
            }
        }

        storage.close()?;
        Ok(())
    }

    /// Runs one generation of peer sessions against `peers`, one thread
    /// each, and supervises `storage` for progress until every peer
    /// session has exited or the torrent completes. Mirrors
    /// `RunDownloadMultithread`'s stall detection: 30s (60s on the final
    /// tracker attempt) without progress ends the generation so the outer
    /// loop can re-announce.
    ///
    /// Returns the first fatal storage error any peer session hit, if any.
    /// A session that hits one sets `terminate` itself, cutting the rest of
    /// the generation short, since a disk write failure dooms every other
    /// session's writes just as much as this one's (spec.md §7).
    fn run_swarm_once(
        &self,
        peers: &[std::net::SocketAddrV4],
        torrent: &TorrentFile,
        storage: &PieceStorage,
        is_final_attempt: bool,
    ) -> Option<StorageError> {
        let info_hash = torrent.info_hash;
        let piece_count = torrent.total_pieces();
        let peer_id = self.peer_id;
        let terminate = AtomicBool::new(false);
        let fatal_error: Mutex<Option<StorageError>> = Mutex::new(None);

        thread::scope(|scope| {
            let handles: Vec<_> = peers
                .iter()
                .map(|peer| {
                    let addr = SocketAddr::V4(*peer);
                    let logger = self.logger.clone();
                    let cfg = self.cfg.clone();
                    let terminate = &terminate;
                    let fatal_error = &fatal_error;
                    thread::Builder::new()
                        .name(format!("peer-{}", addr))
                        .spawn_scoped(scope, move || {
                            let result = PeerSession::run(addr, info_hash, peer_id, piece_count, storage, &cfg, &logger, terminate);
                            if let Err(err) = result {
                                let mut slot = fatal_error.lock().expect("fatal error mutex poisoned");
                                if slot.is_none() {
                                    *slot = Some(err);
                                }
                                terminate.store(true, Ordering::SeqCst);
                            }
                        })
                        .expect("failed to spawn peer session thread")
                })
                .collect();

            let stall_timeout = if is_final_attempt {
                Duration::from_secs(60)
            } else {
                Duration::from_secs(30)
            };
            let check_interval = if is_final_attempt {
                Duration::from_millis(500)
            } else {
                Duration::from_millis(1000)
            };

            let mut last_progress_time = Instant::now();
            let mut last_saved_count = storage.saved_count();

            while storage.saved_count() < storage.total_count() as usize {
                if handles.iter().all(|h| h.is_finished()) {
                    break;
                }
                if terminate.load(Ordering::SeqCst)
                    && fatal_error.lock().expect("fatal error mutex poisoned").is_some()
                {
                    break;
                }
                thread::sleep(check_interval);

                let current_saved_count = storage.saved_count();
                if current_saved_count == last_saved_count {
                    if last_progress_time.elapsed() > stall_timeout {
                        let _ = self.logger.warn(&format!(
                            "swarm stalled at {}/{} pieces, {} peer threads still alive",
                            current_saved_count,
                            storage.total_count(),
                            handles.iter().filter(|h| !h.is_finished()).count()
                        ));
                        break;
                    }
                    if storage.queue_is_empty() && storage.in_flight_count() > 0 {
                        if is_final_attempt {
                            let _ = self.logger.warn(
                                "final attempt: pieces stuck in-flight, forcing them back to the queue",
                            );
                            // Terminating every session unwinds its in-progress
                            // piece back through `requeue_in_progress`, which is
                            // this crate's equivalent of "force-requeue every
                            // unsaved piece" (spec.md §4.6).
                            break;
                        }
                        thread::sleep(Duration::from_secs(5));
                    }
                } else {
                    last_saved_count = current_saved_count;
                    last_progress_time = Instant::now();
                }
            }

            // Whether this generation ended in completion, a stall, a fatal
            // storage error, or every peer thread exiting on its own, cut
            // any survivors loose rather than waiting out their own retry
            // budgets (spec.md §4.6: "set the global terminate flag, call
            // Terminate() on each session, and join all threads").
            terminate.store(true, Ordering::SeqCst);
            for handle in handles {
                let _ = handle.join();
            }
        });

        fatal_error.into_inner().expect("fatal error mutex poisoned")
    }
}

impl From<TrackerError> for SwarmError {
    fn from(_err: TrackerError) -> Self {
        SwarmError::TrackerGaveUp
    }
}
