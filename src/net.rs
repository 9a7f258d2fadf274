//! One TCP connection per request
//!
//! A [`Connection`] is opened for a single request and torn down afterwards.
//! Dropping it always half-closes the write side first, so every exit path,
//! early aborts included, tells the server that the request is over.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, SocketAddrV4, TcpStream};

use crate::error::{ClientError, Result};
use crate::protocol::{CHUNK_SIZE, RESPONSE_PREFIX_LEN};
use crate::protocol_core::{decode_response, ResponseHeader};

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection {
    pub fn open(addr: SocketAddrV4) -> Result<Self> {
        log::info!("connecting to server {}", addr);
        let stream = TcpStream::connect(addr).map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        // Headers are small; push them out immediately
        let _ = stream.set_nodelay(true);
        Ok(Self {
            stream,
            peer: SocketAddr::V4(addr),
        })
    }

    /// Raw stream for payload transfers.
    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Write a complete request (or request fragment) and flush it.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read exactly one response header.
    ///
    /// The fixed `version | status` prefix is read first. When the status
    /// announces a payload, `name_len | name | size` are read with exact
    /// lengths so the payload starts on a known byte boundary. Any other
    /// reply is short and final: whatever trailing header bytes have
    /// already arrived are taken without waiting for more, since the server
    /// keeps its side open until the client half-closes.
    pub fn read_response(&mut self) -> Result<ResponseHeader> {
        let mut raw = Vec::with_capacity(CHUNK_SIZE);
        read_up_to(&mut self.stream, &mut raw, RESPONSE_PREFIX_LEN)?;

        if raw.len() == RESPONSE_PREFIX_LEN && decode_response(&raw).status.has_payload() {
            read_exact_into(&mut self.stream, &mut raw, 2)?;
            let name_len = u16::from_le_bytes([raw[3], raw[4]]) as usize;
            read_exact_into(&mut self.stream, &mut raw, name_len + 4)?;
        } else if raw.len() == RESPONSE_PREFIX_LEN {
            self.read_pending(&mut raw, CHUNK_SIZE - RESPONSE_PREFIX_LEN)?;
        }

        let header = decode_response(&raw);
        log::debug!("response header: {} bytes, {:?}", raw.len(), header);
        Ok(header)
    }

    /// Append at most `max` bytes that are already buffered on the socket.
    fn read_pending(&mut self, buf: &mut Vec<u8>, max: usize) -> Result<()> {
        self.stream.set_nonblocking(true)?;
        let start = buf.len();
        buf.resize(start + max, 0);
        let mut filled = 0;
        let outcome = loop {
            if filled == max {
                break Ok(());
            }
            match self.stream.read(&mut buf[start + filled..]) {
                Ok(0) => break Ok(()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        buf.truncate(start + filled);
        self.stream.set_nonblocking(false)?;
        outcome?;
        Ok(())
    }

    /// Half-close, then close.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        log::debug!("closing connection to {}", self.peer);
        if let Err(e) = self.stream.shutdown(Shutdown::Write) {
            // Peer may already be gone
            if e.kind() != ErrorKind::NotConnected {
                log::debug!("half-close failed: {}", e);
            }
        }
    }
}

/// Append up to `n` bytes, stopping early at end of stream.
fn read_up_to<R: Read + ?Sized>(src: &mut R, buf: &mut Vec<u8>, n: usize) -> Result<()> {
    let start = buf.len();
    buf.resize(start + n, 0);
    let mut filled = 0;
    while filled < n {
        match src.read(&mut buf[start + filled..]) {
            Ok(0) => break,
            Ok(k) => filled += k,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                buf.truncate(start + filled);
                return Err(e.into());
            }
        }
    }
    buf.truncate(start + filled);
    Ok(())
}

fn read_exact_into<R: Read + ?Sized>(src: &mut R, buf: &mut Vec<u8>, n: usize) -> Result<()> {
    let start = buf.len();
    buf.resize(start + n, 0);
    src.read_exact(&mut buf[start..])?;
    Ok(())
}
