//! Scripted fake peer speaking the bkup wire format.
//!
//! Each accepted connection is handed to the next script in line. Scripts
//! read the request, answer it, shut their write side and then wait for the
//! client's half-close so tests can assert it happened.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddrV4, TcpListener, TcpStream};
use std::path::Path;
use std::thread::{self, JoinHandle};

use bkup::{ClientConfig, Settings};

pub const VERSION: u8 = 1;

/// What the fake peer saw on one connection.
#[derive(Debug, Default, Clone)]
pub struct Captured {
    pub uid: u32,
    pub version: u8,
    pub op: u8,
    pub name: String,
    /// Size extension of backup requests
    pub size: Option<u32>,
    pub payload: Vec<u8>,
    /// Client half-closed its side
    pub saw_eof: bool,
}

pub type Script = Box<dyn FnOnce(&mut TcpStream) -> Captured + Send>;

pub struct FakeServer {
    pub addr: SocketAddrV4,
    handle: JoinHandle<Vec<Captured>>,
}

impl FakeServer {
    pub fn start(scripts: Vec<Script>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for script in scripts {
                let (mut stream, _) = listener.accept().unwrap();
                seen.push(script(&mut stream));
            }
            seen
        });
        Self {
            addr: SocketAddrV4::new(Ipv4Addr::LOCALHOST, port),
            handle,
        }
    }

    pub fn finish(self) -> Vec<Captured> {
        self.handle.join().unwrap()
    }
}

/// Config pointing at `addr`, resolving local files in `dir`, no settle delay.
pub fn config_for(addr: SocketAddrV4, dir: &Path, backup_list: &[&str]) -> ClientConfig {
    let settings = Settings {
        settle_delay_ms: 0,
        ..Settings::default()
    };
    ClientConfig::new(addr, backup_list.iter().map(|s| s.to_string()).collect())
        .with_local_dir(dir)
        .with_settings(settings)
}

pub fn read_request(stream: &mut TcpStream) -> Captured {
    let mut hdr = [0u8; 8];
    stream.read_exact(&mut hdr).unwrap();
    let name_len = u16::from_le_bytes([hdr[6], hdr[7]]) as usize;
    let mut name = vec![0u8; name_len];
    stream.read_exact(&mut name).unwrap();
    Captured {
        uid: u32::from_le_bytes([hdr[0], hdr[1], hdr[2], hdr[3]]),
        version: hdr[4],
        op: hdr[5],
        name: String::from_utf8(name).unwrap(),
        ..Captured::default()
    }
}

pub fn reply(status: u16, name: &str, size: Option<u32>) -> Vec<u8> {
    let mut raw = vec![VERSION];
    raw.extend_from_slice(&status.to_le_bytes());
    raw.extend_from_slice(&(name.len() as u16).to_le_bytes());
    raw.extend_from_slice(name.as_bytes());
    if let Some(size) = size {
        raw.extend_from_slice(&size.to_le_bytes());
    }
    raw
}

/// `version | status` only, as servers send for bare acknowledgements.
pub fn reply_prefix(status: u16) -> Vec<u8> {
    let mut raw = vec![VERSION];
    raw.extend_from_slice(&status.to_le_bytes());
    raw
}

/// Shut our write side, then block until the client half-closes.
pub fn finish_conn(stream: &mut TcpStream, captured: &mut Captured) {
    let _ = stream.shutdown(Shutdown::Write);
    let mut rest = Vec::new();
    captured.saw_eof = stream.read_to_end(&mut rest).is_ok();
}

/// Accept a backup and answer with `status`.
pub fn backup_script(status: u16) -> Script {
    Box::new(move |stream| {
        let mut captured = read_request(stream);
        let mut size = [0u8; 4];
        stream.read_exact(&mut size).unwrap();
        let size = u32::from_le_bytes(size);
        captured.size = Some(size);
        let mut payload = vec![0u8; size as usize];
        stream.read_exact(&mut payload).unwrap();
        captured.payload = payload;
        stream.write_all(&reply(status, "", None)).unwrap();
        finish_conn(stream, &mut captured);
        captured
    })
}

/// Serve `content` the way a chunk-padding server does: whole 1024-byte
/// chunks, the last one filled up with junk.
pub fn fetch_script(content: Vec<u8>) -> Script {
    Box::new(move |stream| {
        let mut captured = read_request(stream);
        let name = captured.name.clone();
        stream
            .write_all(&reply(210, &name, Some(content.len() as u32)))
            .unwrap();
        let mut wire = content.clone();
        let padded = wire.len().div_ceil(1024) * 1024;
        wire.resize(padded, 0xee);
        for chunk in wire.chunks(1024) {
            stream.write_all(chunk).unwrap();
        }
        finish_conn(stream, &mut captured);
        captured
    })
}

/// Answer any request with a bare status header.
pub fn status_script(raw_reply: Vec<u8>) -> Script {
    Box::new(move |stream| {
        let mut captured = read_request(stream);
        stream.write_all(&raw_reply).unwrap();
        finish_conn(stream, &mut captured);
        captured
    })
}

/// Answer with a bare status header and keep our side open until the
/// client half-closes, the way a real server ends a session.
pub fn held_open_script(raw_reply: Vec<u8>) -> Script {
    Box::new(move |stream| {
        let mut captured = read_request(stream);
        stream.write_all(&raw_reply).unwrap();
        let mut rest = Vec::new();
        captured.saw_eof = stream.read_to_end(&mut rest).is_ok();
        captured
    })
}

/// Answer a list request with `declared` entries but send `lines`.
pub fn list_script(declared: u32, lines: Vec<&'static str>) -> Script {
    Box::new(move |stream| {
        let mut captured = read_request(stream);
        stream
            .write_all(&reply(211, "0123456789abcdef0123456789abcdef.txt", Some(declared)))
            .unwrap();
        for line in lines {
            stream.write_all(format!("{}\n", line).as_bytes()).unwrap();
        }
        finish_conn(stream, &mut captured);
        captured
    })
}

/// Write a file with a recognisable byte pattern.
pub fn write_pattern(path: &Path, len: usize) -> Vec<u8> {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(path, &data).unwrap();
    data
}
