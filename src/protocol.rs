//! Shared protocol constants for the bkup wire format
//!
//! Every multi-byte integer on the wire is little-endian.

// Protocol header constants
pub const VERSION: u8 = 1;

// uid (4) | version (1) | opcode (1) | name_len (2)
pub const REQUEST_HEADER_LEN: usize = 8;

// version (1) | status (2)
pub const RESPONSE_PREFIX_LEN: usize = 3;

// Transport chunk size, used for file chunking and raw socket reads alike
pub const CHUNK_SIZE: usize = 1024;

// name_len is a u16 on the wire
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

// Backup sizes travel as a u32, so files must stay strictly below 2^32 bytes
pub const MAX_FILE_SIZE: u64 = 1 << 32;

// Request opcodes (keep numeric stable for compat with existing servers)
pub mod opcode {
    pub const BACKUP_FILE: u8 = 100;
    pub const GET_FILE: u8 = 200;
    pub const DELETE_FILE: u8 = 201;
    pub const GET_BACKUP_LIST: u8 = 202;
}

// Response status codes
// Backup and delete share the same success code.
pub mod status {
    pub const GET_FILE_SUC: u16 = 210;
    pub const GET_LIST_SUC: u16 = 211;
    pub const BACKUP_OR_DEL_FILE_SUC: u16 = 212;
    pub const FILE_NOT_FOUND: u16 = 1001;
    pub const NO_CONTENT: u16 = 1002;
    pub const INTERNAL_ERROR: u16 = 1003;
}

// Timing knobs
pub mod timeouts {
    // Pause between the backup header and the first payload chunk (ms).
    // Servers that read the request with a single unframed read would
    // otherwise swallow the start of the payload together with the header.
    pub const SETTLE_MS: u64 = 100;
}
