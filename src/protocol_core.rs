//! Request/response codec for the bkup wire format
//!
//! Pure byte transformations, no I/O. The connection layer in `net` decides
//! how many bytes to read; this module only turns bytes into fields and back.

use std::fmt;

use crate::error::{ClientError, Result};
use crate::protocol::{opcode, status, MAX_NAME_LEN, REQUEST_HEADER_LEN, VERSION};

/// Identifies the requester to the server. Not authenticated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

impl ClientId {
    /// Draw a fresh identifier from the random bits of a v4 UUID.
    pub fn random() -> Self {
        let bytes = uuid::Uuid::new_v4().into_bytes();
        ClientId(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl From<u32> for ClientId {
    fn from(v: u32) -> Self {
        ClientId(v)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four request kinds understood by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Backup,
    Fetch,
    Delete,
    List,
}

impl Op {
    pub fn code(self) -> u8 {
        match self {
            Op::Backup => opcode::BACKUP_FILE,
            Op::Fetch => opcode::GET_FILE,
            Op::Delete => opcode::DELETE_FILE,
            Op::List => opcode::GET_BACKUP_LIST,
        }
    }

    /// Only the list request is sent without a target file.
    pub fn needs_filename(self) -> bool {
        !matches!(self, Op::List)
    }
}

impl TryFrom<u8> for Op {
    type Error = ClientError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            opcode::BACKUP_FILE => Ok(Op::Backup),
            opcode::GET_FILE => Ok(Op::Fetch),
            opcode::DELETE_FILE => Ok(Op::Delete),
            opcode::GET_BACKUP_LIST => Ok(Op::List),
            other => Err(ClientError::InvalidOperation(other)),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Op::Backup => "backup",
            Op::Fetch => "fetch",
            Op::Delete => "delete",
            Op::List => "list",
        };
        f.write_str(name)
    }
}

/// Outcome reported by the server in every response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    FileFetched,
    ListFetched,
    /// Success for both backup and delete.
    Stored,
    NotFound,
    NoContent,
    InternalError,
    Unknown(u16),
}

impl Status {
    pub fn from_code(code: u16) -> Self {
        match code {
            status::GET_FILE_SUC => Status::FileFetched,
            status::GET_LIST_SUC => Status::ListFetched,
            status::BACKUP_OR_DEL_FILE_SUC => Status::Stored,
            status::FILE_NOT_FOUND => Status::NotFound,
            status::NO_CONTENT => Status::NoContent,
            status::INTERNAL_ERROR => Status::InternalError,
            other => Status::Unknown(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Status::FileFetched => status::GET_FILE_SUC,
            Status::ListFetched => status::GET_LIST_SUC,
            Status::Stored => status::BACKUP_OR_DEL_FILE_SUC,
            Status::NotFound => status::FILE_NOT_FOUND,
            Status::NoContent => status::NO_CONTENT,
            Status::InternalError => status::INTERNAL_ERROR,
            Status::Unknown(code) => code,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::FileFetched => "GET_FILE_SUC",
            Status::ListFetched => "GET_LIST_SUC",
            Status::Stored => "BACKUP_OR_DEL_FILE_SUC",
            Status::NotFound => "FILE_NOT_FOUND",
            Status::NoContent => "NO_CONTENT",
            Status::InternalError => "INTERNAL_ERROR",
            Status::Unknown(_) => "UNKNOWN",
        }
    }

    /// Statuses after which the server streams a payload.
    pub fn has_payload(self) -> bool {
        matches!(self, Status::FileFetched | Status::ListFetched)
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Unknown(0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

/// Build a request header (8 bytes + filename)
/// Format: UID (4) | VERSION (1) | OPCODE (1) | NAME_LEN (2) | NAME
///
/// The 4-byte size field that follows a backup header is not part of this
/// encoding; the caller appends it.
pub fn encode_header(uid: ClientId, op: Op, filename: &str) -> Result<Vec<u8>> {
    let name = filename.as_bytes();
    if name.len() > MAX_NAME_LEN {
        return Err(ClientError::FilenameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    if name.is_empty() && op.needs_filename() {
        return Err(ClientError::MissingFilename(op));
    }

    let mut header = Vec::with_capacity(REQUEST_HEADER_LEN + name.len());
    header.extend_from_slice(&uid.0.to_le_bytes());
    header.push(VERSION);
    header.push(op.code());
    header.extend_from_slice(&(name.len() as u16).to_le_bytes());
    header.extend_from_slice(name);
    Ok(header)
}

/// Decoded server response header.
///
/// Servers send headers of different lengths depending on the operation and
/// outcome, so every field past the status is optional on the wire. Fields
/// that did not arrive keep their defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u8,
    pub status: Status,
    pub name_len: u16,
    pub name: Vec<u8>,
    /// Payload size in bytes for files, entry count for listings.
    pub size: u32,
}

impl ResponseHeader {
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Parse a response header from whatever bytes arrived
/// Format: VERSION (1) | STATUS (2) [| NAME_LEN (2)] [| NAME | SIZE (4)]
pub fn decode_response(raw: &[u8]) -> ResponseHeader {
    let mut header = ResponseHeader::default();

    if let Some(&version) = raw.first() {
        header.version = version;
    }
    if let Some(bytes) = raw.get(1..3) {
        header.status = Status::from_code(u16::from_le_bytes([bytes[0], bytes[1]]));
    }

    // name_len only when more than 4 bytes arrived
    if raw.len() > 4 {
        header.name_len = u16::from_le_bytes([raw[3], raw[4]]);
    }

    // name and size only when more than 6 bytes arrived
    if raw.len() > 6 {
        let name_end = 5 + header.name_len as usize;
        let available = name_end.min(raw.len());
        header.name = raw[5..available].to_vec();
        if let Some(bytes) = raw.get(name_end..name_end + 4) {
            header.size = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
    }

    header
}
