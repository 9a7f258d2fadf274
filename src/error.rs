//! Error types for bkup operations

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocol_core::{Op, Status};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    // Local preconditions, raised before any network I/O
    #[error("invalid operation code: {0}")]
    InvalidOperation(u8),
    #[error("filename is {len} bytes long, the wire format allows at most {max}")]
    FilenameTooLong { len: usize, max: usize },
    #[error("{0} requires a filename")]
    MissingFilename(Op),
    #[error("cannot open {path}: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("file {0} is empty")]
    EmptyFile(PathBuf),
    #[error("file {path} is too large: {size} bytes")]
    FileTooLarge { path: PathBuf, size: u64 },
    #[error("no valid server address configured")]
    NoServerAddress,

    // Transport
    #[error("connect {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("socket error after {bytes} of {expected} bytes: {source}")]
    Transfer {
        bytes: u64,
        expected: u64,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Protocol
    #[error("{op} failed: server replied {status}")]
    Status { op: Op, status: Status },
}

impl ClientError {
    /// Bytes that made it across before a transfer was abandoned.
    pub fn partial_bytes(&self) -> Option<u64> {
        match self {
            ClientError::Transfer { bytes, .. } => Some(*bytes),
            _ => None,
        }
    }

    /// Server status behind a protocol-level failure.
    pub fn status(&self) -> Option<Status> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
