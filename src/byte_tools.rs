//! Big-endian integer packing, SHA-1 digests and hex encoding.
//!
//! Mirrors `original_source/include/utils/byte_tools.hpp`: every wire field
//! and file offset in this crate is big-endian, and info-hashes / piece
//! hashes are SHA-1 throughout.

use sha1::{Digest, Sha1};
use std::fmt::Write as _;

/// Packs a `u32` as 4 big-endian bytes.
pub fn u32_to_bytes(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Unpacks 4 big-endian bytes into a `u32`.
pub fn bytes_to_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[0..4]);
    u32::from_be_bytes(buf)
}

/// Packs a `u64` as 8 big-endian bytes.
pub fn u64_to_bytes(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Unpacks 8 big-endian bytes into a `u64`.
pub fn bytes_to_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[0..8]);
    u64::from_be_bytes(buf)
}

/// SHA-1 digest of `data`, raw 20 bytes.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let digest = Sha1::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

/// Lowercase hex encoding of a byte slice.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
