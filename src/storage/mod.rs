//! `PieceStorage`: a FIFO queue of pieces still to download plus the single
//! output file they're written into.
//!
//! Grounded in `original_source/src/core/PieceStorage.cpp`: separate
//! mutexes for the queue and the file (acquired queue-then-file, never the
//! reverse, so two threads can never deadlock against each other), sparse
//! pre-allocation by seeking to the last byte and writing a single zero,
//! and hash-mismatch triggering a silent reset-and-requeue rather than a
//! hard failure. The teacher's own `storage_manager::manager::save_piece`
//! contributes the `seek`-then-`write_all` idiom for writing at an offset.

use crate::metainfo::TorrentFile;
use crate::piece::Piece;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

struct Queue {
    pending: VecDeque<Piece>,
    in_flight: usize,
}

pub struct PieceStorage {
    queue: Mutex<Queue>,
    file: Mutex<File>,
    default_piece_length: u32,
    total_piece_count: u32,
    saved_count: Mutex<usize>,
}

impl PieceStorage {
    /// Builds the queue of every piece in `torrent` and pre-allocates the
    /// output file at `output_dir/torrent.name` to its final size.
    pub fn new(torrent: &TorrentFile, output_dir: &Path) -> Result<PieceStorage, StorageError> {
        let mut pending = VecDeque::with_capacity(torrent.total_pieces() as usize);
        for index in 0..torrent.total_pieces() {
            let length = torrent.piece_length_at(index);
            let hash = torrent.piece_hashes[index as usize];
            pending.push_back(Piece::new(index, length, hash));
        }

        fs::create_dir_all(output_dir)?;
        let path: PathBuf = output_dir.join(&torrent.name);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        if torrent.length > 0 {
            file.seek(SeekFrom::Start(torrent.length - 1))?;
            file.write_all(&[0u8])?;
            file.flush()?;
        }

        Ok(PieceStorage {
            queue: Mutex::new(Queue {
                pending,
                in_flight: 0,
            }),
            file: Mutex::new(file),
            default_piece_length: torrent.piece_length,
            total_piece_count: torrent.total_pieces(),
            saved_count: Mutex::new(0),
        })
    }

    /// Pops the next piece to hand to a peer session, marking it in-flight.
    pub fn next_piece(&self) -> Option<Piece> {
        let mut queue = self.queue.lock().expect("piece queue mutex poisoned");
        let piece = queue.pending.pop_front();
        if piece.is_some() {
            queue.in_flight += 1;
        }
        piece
    }

    /// Returns a piece to the back of the queue without evaluating it —
    /// used when a peer session fails mid-download.
    pub fn requeue(&self, piece: Piece) {
        let mut queue = self.queue.lock().expect("piece queue mutex poisoned");
        queue.in_flight = queue.in_flight.saturating_sub(1);
        queue.pending.push_back(piece);
    }

    /// Validates a completed piece. A hash mismatch resets it and sends it
    /// back to the queue instead of failing the download (spec.md §4.2). A
    /// disk write failure also resets and requeues the piece, so invariant 2
    /// (every piece is queued, in-flight, or persisted — never none of
    /// those) holds even on this path, but the error is still returned: a
    /// storage failure is fatal to the whole download (spec.md §7), and the
    /// caller is responsible for aborting rather than treating `Ok` as the
    /// only outcome that leaves the piece in a consistent place.
    pub fn piece_processed(&self, mut piece: Piece) -> Result<(), StorageError> {
        {
            let mut queue = self.queue.lock().expect("piece queue mutex poisoned");
            queue.in_flight = queue.in_flight.saturating_sub(1);
        }

        if !piece.hash_matches() {
            piece.reset();
            let mut queue = self.queue.lock().expect("piece queue mutex poisoned");
            queue.pending.push_back(piece);
            return Ok(());
        }

        if let Err(err) = self.save_piece_to_disk(&piece) {
            piece.reset();
            let mut queue = self.queue.lock().expect("piece queue mutex poisoned");
            queue.pending.push_back(piece);
            return Err(err);
        }
        Ok(())
    }

    fn save_piece_to_disk(&self, piece: &Piece) -> Result<(), StorageError> {
        let mut file = self.file.lock().expect("output file mutex poisoned");
        let offset = piece.index as u64 * self.default_piece_length as u64;
        let data = piece.concatenated_data();

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&data)?;
        file.flush()?;
        drop(file);

        let mut saved_count = self.saved_count.lock().expect("saved_count mutex poisoned");
        *saved_count += 1;

        Ok(())
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.lock().expect("piece queue mutex poisoned").pending.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.queue.lock().expect("piece queue mutex poisoned").in_flight
    }

    pub fn saved_count(&self) -> usize {
        *self.saved_count.lock().expect("saved_count mutex poisoned")
    }

    pub fn total_count(&self) -> u32 {
        self.total_piece_count
    }

    pub fn is_complete(&self) -> bool {
        self.saved_count() as u32 == self.total_piece_count
    }

    pub fn close(&self) -> Result<(), StorageError> {
        let mut file = self.file.lock().expect("output file mutex poisoned");
        file.flush()?;
        Ok(())
    }
}
