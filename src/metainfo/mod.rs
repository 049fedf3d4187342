//! `.torrent` metainfo loading.
//!
//! Grounded in the teacher's `torrent_parser::torrent::Torrent`, reworked to
//! single-file-only semantics and to compute the info-hash over the raw
//! bytes of the `info` dictionary (spec.md §6) rather than by re-encoding a
//! decoded value.

use crate::bencode::{Bencode, BencodeError};
use std::fs;
use std::io;
use std::path::Path;

pub const SHA1_LENGTH: usize = 20;

#[derive(Debug, Clone)]
pub struct TorrentFile {
    pub announce: String,
    pub name: String,
    pub length: u64,
    pub piece_length: u32,
    pub piece_hashes: Vec<[u8; SHA1_LENGTH]>,
    pub info_hash: [u8; SHA1_LENGTH],
}

#[derive(Debug)]
pub enum MetainfoError {
    Io(io::Error),
    Bencode(BencodeError),
    NotADict,
    MissingAnnounce,
    MissingInfo,
    MissingField(&'static str),
    InvalidField(&'static str),
    PiecesLengthMismatch { expected: usize, actual: usize },
}

impl From<io::Error> for MetainfoError {
    fn from(err: io::Error) -> Self {
        MetainfoError::Io(err)
    }
}

impl From<BencodeError> for MetainfoError {
    fn from(err: BencodeError) -> Self {
        MetainfoError::Bencode(err)
    }
}

impl TorrentFile {
    pub fn total_pieces(&self) -> u32 {
        self.piece_hashes.len() as u32
    }

    /// Length in bytes of the piece at `index` (the last piece is shorter
    /// unless `length` happens to be an exact multiple of `piece_length`,
    /// per `original_source/src/core/PieceStorage.cpp`).
    pub fn piece_length_at(&self, index: u32) -> u32 {
        let last_index = self.total_pieces() - 1;
        if index != last_index {
            return self.piece_length;
        }
        let remainder = (self.length % self.piece_length as u64) as u32;
        if remainder == 0 {
            self.piece_length
        } else {
            remainder
        }
    }

    pub fn announce_scheme(&self) -> &str {
        self.announce
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .unwrap_or("")
    }

    /// Reads and parses a `.torrent` file from disk.
    pub fn load(path: &Path) -> Result<TorrentFile, MetainfoError> {
        let raw = fs::read(path)?;
        Self::from_bytes(&raw)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<TorrentFile, MetainfoError> {
        let decoded = Bencode::decode(raw)?;
        let dict = decoded.as_dict().ok_or(MetainfoError::NotADict)?;

        let announce = dict
            .get(b"announce".as_slice())
            .and_then(Bencode::as_string)
            .ok_or(MetainfoError::MissingAnnounce)?;
        let announce = String::from_utf8_lossy(announce).into_owned();

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingInfo)?;
        let info = info_value.as_dict().ok_or(MetainfoError::MissingInfo)?;

        let name = info
            .get(b"name".as_slice())
            .and_then(Bencode::as_string)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .ok_or(MetainfoError::MissingField("name"))?;

        let length = info
            .get(b"length".as_slice())
            .and_then(Bencode::as_number)
            .ok_or(MetainfoError::MissingField("length"))?;
        if length < 0 {
            return Err(MetainfoError::InvalidField("length"));
        }
        let length = length as u64;

        let piece_length = info
            .get(b"piece length".as_slice())
            .and_then(Bencode::as_number)
            .ok_or(MetainfoError::MissingField("piece length"))?;
        if piece_length <= 0 {
            return Err(MetainfoError::InvalidField("piece length"));
        }
        let piece_length = piece_length as u32;

        let pieces = info
            .get(b"pieces".as_slice())
            .and_then(Bencode::as_string)
            .ok_or(MetainfoError::MissingField("pieces"))?;
        if pieces.len() % SHA1_LENGTH != 0 {
            return Err(MetainfoError::InvalidField("pieces"));
        }
        let expected_piece_count = ((length as f64) / (piece_length as f64)).ceil() as usize;
        let actual_piece_count = pieces.len() / SHA1_LENGTH;
        if actual_piece_count != expected_piece_count {
            return Err(MetainfoError::PiecesLengthMismatch {
                expected: expected_piece_count,
                actual: actual_piece_count,
            });
        }
        let piece_hashes = pieces
            .chunks_exact(SHA1_LENGTH)
            .map(|chunk| {
                let mut hash = [0u8; SHA1_LENGTH];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();

        let (info_start, info_end) = Bencode::find_top_level_dict_value_span(raw, b"info")?;
        let info_hash = crate::byte_tools::sha1(&raw[info_start..info_end]);

        Ok(TorrentFile {
            announce,
            name,
            length,
            piece_length,
            piece_hashes,
            info_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_torrent_bytes(piece_length: i64, length: i64, pieces: &[u8]) -> Vec<u8> {
        format!(
            "d8:announce20:http://tracker.test/4:infod6:lengthi{}e4:name4:test12:piece lengthi{}e6:pieces{}:",
            length,
            piece_length,
            pieces.len()
        )
        .into_bytes()
        .into_iter()
        .chain(pieces.iter().copied())
        .chain(b"ee".iter().copied())
        .collect()
    }

    #[test]
    fn parses_single_piece_torrent() {
        let hash = crate::byte_tools::sha1(&vec![b'A'; 16384]);
        let raw = build_torrent_bytes(16384, 16384, &hash);
        let torrent = TorrentFile::from_bytes(&raw).unwrap();

        assert_eq!(torrent.announce, "http://tracker.test/");
        assert_eq!(torrent.name, "test");
        assert_eq!(torrent.length, 16384);
        assert_eq!(torrent.piece_length, 16384);
        assert_eq!(torrent.total_pieces(), 1);
        assert_eq!(torrent.piece_hashes[0], hash);
    }

    #[test]
    fn last_piece_is_shorter_for_non_multiple_length() {
        let hash_a = [0u8; 20];
        let hash_b = [1u8; 20];
        let mut pieces = Vec::new();
        pieces.extend_from_slice(&hash_a);
        pieces.extend_from_slice(&hash_b);
        let raw = build_torrent_bytes(16384, 24576, &pieces);
        let torrent = TorrentFile::from_bytes(&raw).unwrap();

        assert_eq!(torrent.total_pieces(), 2);
        assert_eq!(torrent.piece_length_at(0), 16384);
        assert_eq!(torrent.piece_length_at(1), 8192);
    }

    #[test]
    fn rejects_pieces_length_mismatch() {
        let raw = build_torrent_bytes(16384, 16384, &[0u8; 19]);
        assert!(matches!(
            TorrentFile::from_bytes(&raw),
            Err(MetainfoError::InvalidField("pieces"))
        ));
    }

    #[test]
    fn info_hash_is_over_raw_info_bytes() {
        let hash = [7u8; 20];
        let raw = build_torrent_bytes(16384, 16384, &hash);
        let (start, end) = Bencode::find_top_level_dict_value_span(&raw, b"info").unwrap();
        let expected = crate::byte_tools::sha1(&raw[start..end]);

        let torrent = TorrentFile::from_bytes(&raw).unwrap();
        assert_eq!(torrent.info_hash, expected);
    }

    #[test]
    fn announce_scheme_is_extracted() {
        let raw = build_torrent_bytes(16384, 16384, &[0u8; 20]);
        let torrent = TorrentFile::from_bytes(&raw).unwrap();
        assert_eq!(torrent.announce_scheme(), "http");
    }
}
