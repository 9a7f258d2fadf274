//! Request orchestration
//!
//! Each public operation is one round trip on a fresh connection:
//! connect, send the request (and payload), read the response header,
//! move the payload if there is one, interpret the status, then half-close
//! and close. Nothing is retried; the first failure ends the operation.

use std::fs::{self, File};
use std::io::{BufWriter, Read};
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::logger::{Logger, NoopLogger};
use crate::net::Connection;
use crate::progress::BarProgress;
use crate::protocol::MAX_FILE_SIZE;
use crate::protocol_core::{encode_header, ClientId, Op, Status};
use crate::transfer::{
    receive_listing, receive_stream, send_stream, NoProgress, Progress, TransferStats,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    pub name: String,
    pub stats: TransferStats,
}

/// Received size disagreed with the local copy of the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeMismatch {
    pub received: u64,
    pub local: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub name: String,
    pub saved_as: PathBuf,
    pub stats: TransferStats,
    pub mismatch: Option<SizeMismatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Name the server gave to the listing.
    pub name: String,
    pub entries: Vec<String>,
}

pub struct Client {
    uid: ClientId,
    config: ClientConfig,
    logger: Arc<dyn Logger>,
    show_progress: bool,
}

impl Client {
    /// Build a client; without an explicit id a random one is drawn.
    pub fn new(uid: Option<ClientId>, config: ClientConfig) -> Self {
        let uid = uid.unwrap_or_else(ClientId::random);
        log::info!("client id: {}", uid);
        Self {
            uid,
            config,
            logger: Arc::new(NoopLogger),
            show_progress: false,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn uid(&self) -> ClientId {
        self.uid
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backup_list(&self) -> &[String] {
        &self.config.backup_list
    }

    fn server(&self) -> Result<SocketAddrV4> {
        self.config.server.ok_or(ClientError::NoServerAddress)
    }

    fn progress(&self, label: String) -> Box<dyn Progress> {
        if self.show_progress {
            Box::new(BarProgress::new(&label))
        } else {
            Box::new(NoProgress)
        }
    }

    /// Log start and failure of one operation around `f`.
    fn run<T>(&self, op: Op, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.logger.start(self.uid, op, name);
        let result = f();
        if let Err(ref e) = result {
            log::error!("{} {:?}: {}", op, name, e);
            self.logger.error(op, name, &e.to_string());
        }
        result
    }

    fn check_status(&self, op: Op, name: &str, status: Status, want: Status) -> Result<()> {
        log::info!("server's response code: {}", status.label());
        self.logger.status(op, name, status);
        if status != want {
            return Err(ClientError::Status { op, status });
        }
        Ok(())
    }

    /// Upload a local file from the backup directory under the same name.
    pub fn backup_file(&self, name: &str) -> Result<BackupOutcome> {
        self.run(Op::Backup, name, || self.backup_inner(name))
    }

    fn backup_inner(&self, name: &str) -> Result<BackupOutcome> {
        log::info!("backing up: {}", name);
        let path = self.config.local_path(name);
        let file = File::open(&path).map_err(|source| ClientError::LocalFile {
            path: path.clone(),
            source,
        })?;
        let size = file.metadata()?.len();
        if size == 0 {
            return Err(ClientError::EmptyFile(path));
        }
        if size >= MAX_FILE_SIZE {
            return Err(ClientError::FileTooLarge { path, size });
        }

        // Header plus the 4-byte size extension only backups carry
        let mut request = encode_header(self.uid, Op::Backup, name)?;
        request.extend_from_slice(&(size as u32).to_le_bytes());
        let addr = self.server()?;

        log::info!("sending file of {} bytes", size);
        let mut conn = Connection::open(addr)?;
        conn.send(&request)?;

        let delay = self.config.settings.settle_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        // Never send past the size announced in the header
        let mut body = file.take(size);
        let progress = self.progress(format!("backup {}", name));
        let stats = send_stream(
            &mut body,
            conn.stream(),
            self.config.settings.chunk_size,
            size,
            progress.as_ref(),
        )?;
        if stats.bytes != size {
            let msg = format!("file changed while sending: {} of {} bytes", stats.bytes, size);
            log::warn!("{}", msg);
            self.logger.warning(Op::Backup, name, &msg);
        }
        self.logger.transferred(Op::Backup, name, stats.bytes);

        let response = conn.read_response()?;
        conn.close();
        self.check_status(Op::Backup, name, response.status, Status::Stored)?;

        Ok(BackupOutcome {
            name: name.to_string(),
            stats,
        })
    }

    /// Back up every file of the configured backup list, one connection
    /// each. A failing file does not stop the rest.
    pub fn backup_all(&self) -> Vec<(String, Result<BackupOutcome>)> {
        self.config
            .backup_list
            .iter()
            .map(|name| (name.clone(), self.backup_file(name)))
            .collect()
    }

    /// Download `name` from the server into `save_as`.
    pub fn fetch_file(&self, name: &str, save_as: &Path) -> Result<FetchOutcome> {
        self.run(Op::Fetch, name, || self.fetch_inner(name, save_as))
    }

    fn fetch_inner(&self, name: &str, save_as: &Path) -> Result<FetchOutcome> {
        log::info!("requesting {} from the server", name);
        let request = encode_header(self.uid, Op::Fetch, name)?;
        let addr = self.server()?;

        let dest_path = self.config.local_path(save_as);
        let dest = File::create(&dest_path).map_err(|source| ClientError::LocalFile {
            path: dest_path.clone(),
            source,
        })?;
        log::info!("the downloaded file will be saved as {}", dest_path.display());

        // Until the payload starts, a failure must not leave an empty file behind
        let (mut conn, size) = match self.fetch_header(addr, &request, name) {
            Ok(ok) => ok,
            Err(e) => {
                drop(dest);
                if let Err(rm) = fs::remove_file(&dest_path) {
                    log::warn!("cannot remove {}: {}", dest_path.display(), rm);
                }
                return Err(e);
            }
        };

        log::info!("downloading file of {} bytes", size);
        let progress = self.progress(format!("fetch {}", name));
        let mut sink = BufWriter::new(dest);
        let stats = receive_stream(
            conn.stream(),
            &mut sink,
            size,
            self.config.settings.chunk_size,
            progress.as_ref(),
        )?;
        drop(sink);
        conn.close();
        self.logger.transferred(Op::Fetch, name, stats.bytes);
        log::info!("received file of {} bytes", stats.bytes);

        let mismatch = self.compare_with_local(name, stats.bytes);
        Ok(FetchOutcome {
            name: name.to_string(),
            saved_as: dest_path,
            stats,
            mismatch,
        })
    }

    fn fetch_header(
        &self,
        addr: SocketAddrV4,
        request: &[u8],
        name: &str,
    ) -> Result<(Connection, u64)> {
        let mut conn = Connection::open(addr)?;
        conn.send(request)?;
        let response = conn.read_response()?;
        self.check_status(Op::Fetch, name, response.status, Status::FileFetched)?;
        Ok((conn, response.size as u64))
    }

    /// Best-effort sanity check against the local file of the same name.
    /// The local file is not guaranteed to be the one that was backed up.
    fn compare_with_local(&self, name: &str, received: u64) -> Option<SizeMismatch> {
        let local = match fs::metadata(self.config.local_path(name)) {
            Ok(meta) => meta.len(),
            Err(e) => {
                log::debug!("no local copy of {} to compare against: {}", name, e);
                return None;
            }
        };
        if local == received {
            return None;
        }
        let msg = format!(
            "received file size {} does not equal local file size {}",
            received, local
        );
        log::warn!("{}", msg);
        self.logger.warning(Op::Fetch, name, &msg);
        Some(SizeMismatch { received, local })
    }

    /// Ask the server to erase `name` from this client's backup.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        self.run(Op::Delete, name, || {
            log::info!("requesting to erase {}", name);
            let request = encode_header(self.uid, Op::Delete, name)?;
            let mut conn = Connection::open(self.server()?)?;
            conn.send(&request)?;
            let response = conn.read_response()?;
            conn.close();
            self.check_status(Op::Delete, name, response.status, Status::Stored)
        })
    }

    /// Fetch the list of files backed up by this client.
    pub fn list_files(&self) -> Result<Listing> {
        self.run(Op::List, "", || {
            log::info!("requesting list of backed up files");
            let request = encode_header(self.uid, Op::List, "")?;
            let mut conn = Connection::open(self.server()?)?;
            conn.send(&request)?;
            let response = conn.read_response()?;
            self.check_status(Op::List, "", response.status, Status::ListFetched)?;

            let entries = receive_listing(
                conn.stream(),
                response.size,
                self.config.settings.chunk_size,
            )?;
            conn.close();
            Ok(Listing {
                name: response.name_lossy(),
                entries,
            })
        })
    }
}
