//! Client configuration
//!
//! Two sources feed a client:
//! - the collaborator files `server.info` (`ip:port`) and `backup.info`
//!   (one filename per line), folded into a [`ClientConfig`];
//! - an optional TOML settings file with transfer tunables ([`Settings`]).
//!
//! Malformed collaborator files never abort construction: the problem is
//! logged and the affected field keeps its default.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::{timeouts, CHUNK_SIZE};

pub const SERVER_INFO_FILE: &str = "server.info";
pub const BACKUP_INFO_FILE: &str = "backup.info";
pub const SETTINGS_FILE: &str = "bkup.toml";

/// The only server address the client agrees to talk to.
pub const ALLOWED_HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Where to connect and which local files to back up.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub server: Option<SocketAddrV4>,
    pub backup_list: Vec<String>,
    /// Local names (backup sources, fetch destinations) resolve against this
    /// directory; the names sent on the wire are left untouched.
    pub local_dir: PathBuf,
    pub settings: Settings,
}

impl ClientConfig {
    pub fn new(server: SocketAddrV4, backup_list: Vec<String>) -> Self {
        Self {
            server: Some(server),
            backup_list,
            local_dir: PathBuf::new(),
            settings: Settings::default(),
        }
    }

    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = dir.into();
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Read `server.info` and `backup.info` from `dir`.
    pub fn from_dir(dir: &Path) -> Self {
        let server = match std::fs::read_to_string(dir.join(SERVER_INFO_FILE)) {
            Ok(contents) => parse_server_info(&contents),
            Err(e) => {
                log::error!("cannot read {}: {}", dir.join(SERVER_INFO_FILE).display(), e);
                None
            }
        };
        if let Some(addr) = server {
            log::info!("server info {}", addr);
        }

        let backup_list = match std::fs::read_to_string(dir.join(BACKUP_INFO_FILE)) {
            Ok(contents) => parse_backup_list(&contents),
            Err(e) => {
                log::error!("cannot read {}: {}", dir.join(BACKUP_INFO_FILE).display(), e);
                Vec::new()
            }
        };

        Self {
            server,
            backup_list,
            local_dir: dir.to_path_buf(),
            settings: Settings::default(),
        }
    }

    /// Resolve a local name against [`ClientConfig::local_dir`].
    pub fn local_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.local_dir.join(name)
    }
}

/// Parse the first line of `server.info`.
///
/// The host must literally be `127.0.0.1` and the port 1 to 4 ASCII digits.
pub fn parse_server_info(contents: &str) -> Option<SocketAddrV4> {
    let line = contents.lines().next().unwrap_or("").trim();
    let Some((host, port)) = line.split_once(':') else {
        log::error!("error in server.info: expected ip:port, got {:?}", line);
        return None;
    };

    if host != ALLOWED_HOST.to_string() {
        log::error!("error in server.info: server address isn't {}", ALLOWED_HOST);
        return None;
    }
    if port.is_empty() || port.len() > 4 || !port.bytes().all(|b| b.is_ascii_digit()) {
        log::error!("error in server.info: port {:?} isn't in valid format", port);
        return None;
    }
    // At most four digits, so this always fits
    let port: u16 = port.parse().ok()?;
    if port == 0 {
        log::error!("error in server.info: port 0 is not connectable");
        return None;
    }

    Some(SocketAddrV4::new(ALLOWED_HOST, port))
}

/// One filename per line; surrounding whitespace and blank lines are dropped.
pub fn parse_backup_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Transfer tunables, optionally loaded from `bkup.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub chunk_size: usize,
    pub settle_delay_ms: u64,
    pub log_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            settle_delay_ms: timeouts::SETTLE_MS,
            log_file: None,
            log_format: LogFormat::Text,
        }
    }
}

impl Settings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(data)?;
        if settings.chunk_size == 0 {
            bail!("chunk_size must be at least 1 byte");
        }
        Ok(settings)
    }

    /// Load settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => Self::from_toml(&data)
                .with_context(|| format!("invalid settings file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_server_info_valid() {
        let addr = parse_server_info("127.0.0.1:8080\n").unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080));

        let addr = parse_server_info("127.0.0.1:1").unwrap();
        assert_eq!(addr.port(), 1);
    }

    #[test]
    fn test_parse_server_info_rejects_other_hosts() {
        assert!(parse_server_info("10.0.0.1:8080").is_none());
        assert!(parse_server_info("localhost:8080").is_none());
        assert!(parse_server_info("127.0.0.2:8080").is_none());
    }

    #[test]
    fn test_parse_server_info_rejects_bad_ports() {
        assert!(parse_server_info("127.0.0.1:12345").is_none()); // 5 digits
        assert!(parse_server_info("127.0.0.1:").is_none());
        assert!(parse_server_info("127.0.0.1:80a").is_none());
        assert!(parse_server_info("127.0.0.1:-80").is_none());
        assert!(parse_server_info("127.0.0.1:0").is_none());
        assert!(parse_server_info("127.0.0.1").is_none());
        assert!(parse_server_info("").is_none());
    }

    #[test]
    fn test_parse_server_info_only_first_line() {
        let addr = parse_server_info("127.0.0.1:1234\n127.0.0.1:9999\n").unwrap();
        assert_eq!(addr.port(), 1234);
    }

    #[test]
    fn test_parse_backup_list() {
        let list = parse_backup_list("a.txt\n  b.bin  \n\n c/d.dat\r\n");
        assert_eq!(list, vec!["a.txt", "b.bin", "c/d.dat"]);
        assert!(parse_backup_list("").is_empty());
    }

    #[test]
    fn test_from_dir_reads_both_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(SERVER_INFO_FILE), "127.0.0.1:4321\n").unwrap();
        fs::write(tmp.path().join(BACKUP_INFO_FILE), "one.txt\ntwo.txt\n").unwrap();

        let config = ClientConfig::from_dir(tmp.path());
        assert_eq!(config.server, Some(SocketAddrV4::new(ALLOWED_HOST, 4321)));
        assert_eq!(config.backup_list, vec!["one.txt", "two.txt"]);
        assert_eq!(config.local_path("one.txt"), tmp.path().join("one.txt"));
    }

    #[test]
    fn test_from_dir_defaults_on_missing_or_malformed_files() {
        let tmp = TempDir::new().unwrap();
        let config = ClientConfig::from_dir(tmp.path());
        assert_eq!(config.server, None);
        assert!(config.backup_list.is_empty());

        fs::write(tmp.path().join(SERVER_INFO_FILE), "192.168.1.5:4321\n").unwrap();
        fs::write(tmp.path().join(BACKUP_INFO_FILE), "kept.txt\n").unwrap();
        let config = ClientConfig::from_dir(tmp.path());
        assert_eq!(config.server, None);
        assert_eq!(config.backup_list, vec!["kept.txt"]);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.chunk_size, 1024);
        assert_eq!(settings.settle_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_settings_overrides() {
        let settings = Settings::from_toml(
            r#"
            chunk_size = 4096
            settle_delay_ms = 0
            log_file = "ops.jsonl"
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(settings.chunk_size, 4096);
        assert_eq!(settings.settle_delay(), Duration::ZERO);
        assert_eq!(settings.log_file, Some(PathBuf::from("ops.jsonl")));
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn test_settings_rejects_unknown_keys_and_zero_chunk() {
        assert!(Settings::from_toml("chunk = 10").is_err());
        assert!(Settings::from_toml("chunk_size = 0").is_err());
    }

    #[test]
    fn test_settings_load_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(&tmp.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings, Settings::default());

        fs::write(tmp.path().join(SETTINGS_FILE), "settle_delay_ms = 5\n").unwrap();
        let settings = Settings::load(&tmp.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings.settle_delay_ms, 5);
    }
}
