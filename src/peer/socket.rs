//! Framed TCP transport to a single peer.
//!
//! Grounded in `original_source/include/net/TcpSocket.hpp`'s
//! connect-timeout/read-timeout pair and `PeerConnect.cpp`'s use of
//! `ReceiveData()` for both the fixed-size handshake read and the
//! length-prefixed message reads. Oversize-frame rejection follows
//! spec.md §4.3 — a peer claiming a frame bigger than
//! `wire::message::MAX_FRAME_LENGTH` is treated as hostile or corrupt.

use crate::wire::message::MAX_FRAME_LENGTH;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

#[derive(Debug)]
pub enum PeerSocketError {
    Connect(io::Error),
    SetTimeout(io::Error),
    Read(io::Error),
    Write(io::Error),
    OversizeFrame(u32),
}

pub struct PeerSocket {
    stream: Option<TcpStream>,
}

impl PeerSocket {
    pub fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_write_timeout: Duration,
    ) -> Result<PeerSocket, PeerSocketError> {
        let stream =
            TcpStream::connect_timeout(&addr, connect_timeout).map_err(PeerSocketError::Connect)?;
        stream
            .set_read_timeout(Some(read_write_timeout))
            .map_err(PeerSocketError::SetTimeout)?;
        stream
            .set_write_timeout(Some(read_write_timeout))
            .map_err(PeerSocketError::SetTimeout)?;
        Ok(PeerSocket {
            stream: Some(stream),
        })
    }

    fn stream_mut(&mut self) -> &mut TcpStream {
        self.stream.as_mut().expect("socket used after close")
    }

    pub fn send_bytes(&mut self, data: &[u8]) -> Result<(), PeerSocketError> {
        self.stream_mut()
            .write_all(data)
            .map_err(PeerSocketError::Write)
    }

    /// Reads exactly `len` bytes — used for the fixed 68-byte handshake.
    pub fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>, PeerSocketError> {
        let mut buf = vec![0u8; len];
        self.stream_mut()
            .read_exact(&mut buf)
            .map_err(PeerSocketError::Read)?;
        Ok(buf)
    }

    /// Reads one length-prefixed wire message frame. Returns an empty
    /// payload for a keep-alive (zero-length frame).
    pub fn receive_frame(&mut self) -> Result<Vec<u8>, PeerSocketError> {
        let mut length_bytes = [0u8; 4];
        self.stream_mut()
            .read_exact(&mut length_bytes)
            .map_err(PeerSocketError::Read)?;
        let length = u32::from_be_bytes(length_bytes);

        if length > MAX_FRAME_LENGTH {
            return Err(PeerSocketError::OversizeFrame(length));
        }
        if length == 0 {
            return Ok(Vec::new());
        }

        let mut payload = vec![0u8; length as usize];
        self.stream_mut()
            .read_exact(&mut payload)
            .map_err(PeerSocketError::Read)?;
        Ok(payload)
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl Drop for PeerSocket {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn receive_frame_rejects_oversize_length() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream
                .write_all(&(MAX_FRAME_LENGTH + 1).to_be_bytes())
                .unwrap();
        });

        let mut socket =
            PeerSocket::connect(addr, Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let result = socket.receive_frame();
        assert!(matches!(result, Err(PeerSocketError::OversizeFrame(_))));
        handle.join().unwrap();
    }

    #[test]
    fn receive_frame_decodes_zero_length_as_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&0u32.to_be_bytes()).unwrap();
        });

        let mut socket =
            PeerSocket::connect(addr, Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let payload = socket.receive_frame().unwrap();
        assert!(payload.is_empty());
        handle.join().unwrap();
    }

    #[test]
    fn send_and_receive_round_trip_exact_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut socket =
            PeerSocket::connect(addr, Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        socket.send_bytes(b"hello").unwrap();
        let echoed = socket.receive_exact(5).unwrap();
        assert_eq!(echoed, b"hello");
        handle.join().unwrap();
    }
}
