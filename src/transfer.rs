//! Chunked payload transfer
//!
//! Moves file bodies between a local reader/writer and the connection in
//! fixed-size chunks while keeping an exact byte count.

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};

use crate::error::{ClientError, Result};
use crate::protocol::MAX_NAME_LEN;

/// Observer for transfer progress. All hooks default to no-ops.
pub trait Progress {
    fn begin(&self, _total: u64) {}
    fn advance(&self, _done: u64) {}
    fn finish(&self) {}
}

pub struct NoProgress;
impl Progress for NoProgress {}

/// Statistics for a single payload transfer
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransferStats {
    /// Bytes moved so far
    pub bytes: u64,
    /// Size announced for the payload (local stat for uploads, header for downloads)
    pub expected: u64,
    /// Number of chunk writes performed
    pub chunks: u64,
}

impl TransferStats {
    pub fn new(expected: u64) -> Self {
        Self {
            expected,
            ..Self::default()
        }
    }

    fn add_chunk(&mut self, bytes: usize) {
        self.bytes += bytes as u64;
        self.chunks += 1;
    }

    fn abandon(&self, source: io::Error) -> ClientError {
        ClientError::Transfer {
            bytes: self.bytes,
            expected: self.expected,
            source,
        }
    }
}

/// Fill `buf` from `source`, stopping early only at end of input.
fn read_chunk<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Send everything `source` yields to `conn`, one `chunk_size` write at a time.
///
/// Every write but the last carries exactly `chunk_size` bytes. A failed
/// write abandons the transfer; the error carries the count sent so far.
pub fn send_stream<R, W>(
    source: &mut R,
    conn: &mut W,
    chunk_size: usize,
    expected: u64,
    progress: &dyn Progress,
) -> Result<TransferStats>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut stats = TransferStats::new(expected);
    let mut buf = vec![0u8; chunk_size.max(1)];
    progress.begin(expected);

    loop {
        let n = read_chunk(source, &mut buf)?;
        if n == 0 {
            break;
        }
        conn.write_all(&buf[..n]).map_err(|e| stats.abandon(e))?;
        stats.add_chunk(n);
        progress.advance(stats.bytes);
    }
    conn.flush().map_err(|e| stats.abandon(e))?;

    progress.finish();
    log::debug!("sent {} bytes in {} chunks", stats.bytes, stats.chunks);
    Ok(stats)
}

/// Copy exactly `declared` bytes from `conn` into `sink`.
///
/// Transport reads are `chunk_size` wide and may run past the declared
/// boundary; only the prefix up to `declared` is written and the rest is
/// dropped. End of stream before `declared` bytes is reported as a transfer
/// error carrying the partial count.
pub fn receive_stream<R, W>(
    conn: &mut R,
    sink: &mut W,
    declared: u64,
    chunk_size: usize,
    progress: &dyn Progress,
) -> Result<TransferStats>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut stats = TransferStats::new(declared);
    let mut buf = vec![0u8; chunk_size.max(1)];
    progress.begin(declared);

    while stats.bytes < declared {
        let n = match conn.read(&mut buf) {
            Ok(0) => {
                return Err(stats.abandon(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed before payload completed",
                )))
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(stats.abandon(e)),
        };

        let remaining = declared - stats.bytes;
        let take = (n as u64).min(remaining) as usize;
        if take < n {
            log::debug!("dropping {} bytes past the declared payload size", n - take);
        }
        sink.write_all(&buf[..take])?;
        stats.add_chunk(take);
        progress.advance(stats.bytes);
    }
    sink.flush()?;

    progress.finish();
    log::debug!("received {} of {} bytes", stats.bytes, declared);
    Ok(stats)
}

// Longest entry plus its newline
const ENTRY_CAP: u64 = MAX_NAME_LEN as u64 + 1;

/// Read a newline-delimited listing of `entries` lines.
///
/// Stops after the announced number of entries or at end of stream,
/// whichever comes first. Anything past the last announced entry is ignored.
/// An entry longer than a wire filename can be is rejected as invalid data.
pub fn receive_listing<R>(conn: &mut R, entries: u32, chunk_size: usize) -> Result<Vec<String>>
where
    R: Read + ?Sized,
{
    let mut reader = BufReader::with_capacity(chunk_size.max(1), conn);
    let mut lines = Vec::with_capacity(entries.min(1024) as usize);
    let mut line = Vec::new();

    while lines.len() < entries as usize {
        line.clear();
        let n = (&mut reader).take(ENTRY_CAP).read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        if n as u64 == ENTRY_CAP && line.last() != Some(&b'\n') {
            return Err(ClientError::Io(io::Error::new(
                ErrorKind::InvalidData,
                format!("listing entry longer than {} bytes", MAX_NAME_LEN),
            )));
        }
        let text = String::from_utf8_lossy(&line);
        lines.push(text.trim_end_matches(['\n', '\r']).to_string());
    }

    if lines.len() < entries as usize {
        log::warn!(
            "listing ended after {} of {} announced entries",
            lines.len(),
            entries
        );
    }
    Ok(lines)
}
