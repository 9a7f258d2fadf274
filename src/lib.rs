//! bkup library
//!
//! Client side of a stateless, connection-per-request binary backup
//! protocol: wire codec, chunked transfer engine and request orchestration.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod net;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod transfer;

pub use client::{BackupOutcome, Client, FetchOutcome, Listing, SizeMismatch};
pub use config::{ClientConfig, Settings};
pub use error::{ClientError, Result};
pub use protocol_core::{decode_response, encode_header, ClientId, Op, ResponseHeader, Status};
