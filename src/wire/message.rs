//! Peer wire protocol messages: `[u32 be length][u8 id][payload]`.
//!
//! Grounded in the teacher's `peer::message::Message`, generalized with a
//! `KeepAlive` variant (a zero-length frame carries no id at all, per
//! spec.md §4.4) instead of treating it as an error case.

use crate::byte_tools::{bytes_to_u32, u32_to_bytes};

/// Peers reject anything claiming to be larger than this as hostile or
/// corrupt (spec.md §4.3).
pub const MAX_FRAME_LENGTH: u32 = 100_000;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
}

impl MessageId {
    fn from_byte(byte: u8) -> Option<MessageId> {
        Some(match byte {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            9 => MessageId::Port,
            _ => return None,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bits: Vec<u8> },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, data: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    Port { port: u16 },
    /// A recognized id whose payload this crate doesn't act on; forwarded
    /// unchanged so the caller can choose to ignore it (spec.md §4.5: "Other
    /// ids → ignored").
    Unknown { id: u8, payload: Vec<u8> },
}

#[derive(Debug)]
pub enum MessageError {
    OversizeFrame(u32),
    TruncatedPayload,
}

impl Message {
    /// Encodes a logical message to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let (id, payload): (Option<u8>, Vec<u8>) = match self {
            Message::KeepAlive => return u32_to_bytes(0).to_vec(),
            Message::Choke => (Some(MessageId::Choke as u8), vec![]),
            Message::Unchoke => (Some(MessageId::Unchoke as u8), vec![]),
            Message::Interested => (Some(MessageId::Interested as u8), vec![]),
            Message::NotInterested => (Some(MessageId::NotInterested as u8), vec![]),
            Message::Have { piece_index } => {
                (Some(MessageId::Have as u8), u32_to_bytes(*piece_index).to_vec())
            }
            Message::Bitfield { bits } => (Some(MessageId::Bitfield as u8), bits.clone()),
            Message::Request { index, begin, length } => {
                let mut payload = Vec::with_capacity(12);
                payload.extend_from_slice(&u32_to_bytes(*index));
                payload.extend_from_slice(&u32_to_bytes(*begin));
                payload.extend_from_slice(&u32_to_bytes(*length));
                (Some(MessageId::Request as u8), payload)
            }
            Message::Piece { index, begin, data } => {
                let mut payload = Vec::with_capacity(8 + data.len());
                payload.extend_from_slice(&u32_to_bytes(*index));
                payload.extend_from_slice(&u32_to_bytes(*begin));
                payload.extend_from_slice(data);
                (Some(MessageId::Piece as u8), payload)
            }
            Message::Cancel { index, begin, length } => {
                let mut payload = Vec::with_capacity(12);
                payload.extend_from_slice(&u32_to_bytes(*index));
                payload.extend_from_slice(&u32_to_bytes(*begin));
                payload.extend_from_slice(&u32_to_bytes(*length));
                (Some(MessageId::Cancel as u8), payload)
            }
            Message::Port { port } => (Some(MessageId::Port as u8), port.to_be_bytes().to_vec()),
            Message::Unknown { id, payload } => (Some(*id), payload.clone()),
        };
        let id = id.expect("non-keepalive variants always carry an id");

        let length = 1 + payload.len() as u32;
        let mut out = Vec::with_capacity(4 + length as usize);
        out.extend_from_slice(&u32_to_bytes(length));
        out.push(id);
        out.extend_from_slice(&payload);
        out
    }

    /// Decodes a single already-length-delimited frame, i.e. `raw` is the
    /// `[u8 id][payload]` portion with the 4-byte length prefix already
    /// consumed by the transport. `raw.is_empty()` decodes as `KeepAlive`.
    pub fn decode(raw: &[u8]) -> Result<Message, MessageError> {
        if raw.is_empty() {
            return Ok(Message::KeepAlive);
        }
        let id = raw[0];
        let payload = &raw[1..];

        let message = match MessageId::from_byte(id) {
            Some(MessageId::Choke) => Message::Choke,
            Some(MessageId::Unchoke) => Message::Unchoke,
            Some(MessageId::Interested) => Message::Interested,
            Some(MessageId::NotInterested) => Message::NotInterested,
            Some(MessageId::Have) => {
                if payload.len() < 4 {
                    return Err(MessageError::TruncatedPayload);
                }
                Message::Have {
                    piece_index: bytes_to_u32(payload),
                }
            }
            Some(MessageId::Bitfield) => Message::Bitfield {
                bits: payload.to_vec(),
            },
            Some(MessageId::Request) => {
                if payload.len() < 12 {
                    return Err(MessageError::TruncatedPayload);
                }
                Message::Request {
                    index: bytes_to_u32(&payload[0..4]),
                    begin: bytes_to_u32(&payload[4..8]),
                    length: bytes_to_u32(&payload[8..12]),
                }
            }
            Some(MessageId::Piece) => {
                if payload.len() < 8 {
                    return Err(MessageError::TruncatedPayload);
                }
                Message::Piece {
                    index: bytes_to_u32(&payload[0..4]),
                    begin: bytes_to_u32(&payload[4..8]),
                    data: payload[8..].to_vec(),
                }
            }
            Some(MessageId::Cancel) => {
                if payload.len() < 12 {
                    return Err(MessageError::TruncatedPayload);
                }
                Message::Cancel {
                    index: bytes_to_u32(&payload[0..4]),
                    begin: bytes_to_u32(&payload[4..8]),
                    length: bytes_to_u32(&payload[8..12]),
                }
            }
            Some(MessageId::Port) => {
                if payload.len() < 2 {
                    return Err(MessageError::TruncatedPayload);
                }
                Message::Port {
                    port: u16::from_be_bytes([payload[0], payload[1]]),
                }
            }
            None => Message::Unknown {
                id,
                payload: payload.to_vec(),
            },
        };
        Ok(message)
    }
}
