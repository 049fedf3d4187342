//! Line-oriented `config.cfg` reader.
//!
//! Grounded in the teacher's `config::cfg::Cfg`: `KEY=VALUE` lines, one
//! setting per line. Unlike the teacher, a missing or unreadable config file
//! is not fatal here (spec.md §6, ambient config) — `Cfg::load_or_default`
//! falls back to defaults so a from-scratch run with no `config.cfg` still
//! works.

use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

const TCP_PORT: &str = "TCP_PORT";
const LOG_DIRECTORY: &str = "LOG_DIRECTORY";
const CONNECT_TIMEOUT_MS: &str = "CONNECT_TIMEOUT_MS";
const READ_WRITE_TIMEOUT_MS: &str = "READ_WRITE_TIMEOUT_MS";
const INACTIVITY_TIMEOUT_SECS: &str = "INACTIVITY_TIMEOUT_SECS";
const MAX_PEERS: &str = "MAX_PEERS";
const TRACKER_RETRY_ATTEMPTS: &str = "TRACKER_RETRY_ATTEMPTS";
const TRACKER_RETRY_PAUSE_SECS: &str = "TRACKER_RETRY_PAUSE_SECS";
const SESSION_RETRY_ATTEMPTS: &str = "SESSION_RETRY_ATTEMPTS";

/// Settings that control timeouts, concurrency and retry behavior, read
/// from `config.cfg` (grounded in `original_source/src/net/PeerConnect.cpp`
/// for the default timeout values: 15s connect, 30s read/write, 120s
/// inactivity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cfg {
    pub tcp_port: u16,
    pub log_directory: String,
    pub connect_timeout: Duration,
    pub read_write_timeout: Duration,
    pub inactivity_timeout: Duration,
    pub max_peers: usize,
    pub tracker_retry_attempts: u32,
    pub tracker_retry_pause: Duration,
    pub session_retry_attempts: u32,
}

impl Default for Cfg {
    fn default() -> Self {
        Self {
            tcp_port: 6881,
            log_directory: ".".to_string(),
            connect_timeout: Duration::from_millis(15_000),
            read_write_timeout: Duration::from_millis(30_000),
            inactivity_timeout: Duration::from_secs(120),
            max_peers: 30,
            tracker_retry_attempts: 5,
            tracker_retry_pause: Duration::from_secs(10),
            session_retry_attempts: 5,
        }
    }
}

#[derive(Debug)]
pub enum CfgError {
    Io(io::Error),
    InvalidLine(String),
    UnknownSetting(String),
    InvalidValue { setting: &'static str, value: String },
}

impl From<io::Error> for CfgError {
    fn from(err: io::Error) -> Self {
        CfgError::Io(err)
    }
}

impl Cfg {
    /// Parses a `config.cfg` file. Each line must be `KEY=VALUE`; unknown
    /// keys or malformed lines are errors.
    pub fn new(path: &Path) -> Result<Cfg, CfgError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut cfg = Cfg::default();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| CfgError::InvalidLine(line.clone()))?;
            cfg.apply_setting(key, value)?;
        }
        Ok(cfg)
    }

    /// Like `new`, but a missing config file yields defaults instead of an
    /// error — `config.cfg` is ambient, not a required CLI argument.
    pub fn load_or_default(path: &Path) -> Result<Cfg, CfgError> {
        match Cfg::new(path) {
            Ok(cfg) => Ok(cfg),
            Err(CfgError::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(Cfg::default()),
            Err(err) => Err(err),
        }
    }

    fn apply_setting(&mut self, key: &str, value: &str) -> Result<(), CfgError> {
        match key {
            TCP_PORT => self.tcp_port = parse(TCP_PORT, value)?,
            LOG_DIRECTORY => self.log_directory = value.to_string(),
            CONNECT_TIMEOUT_MS => {
                self.connect_timeout = Duration::from_millis(parse(CONNECT_TIMEOUT_MS, value)?)
            }
            READ_WRITE_TIMEOUT_MS => {
                self.read_write_timeout =
                    Duration::from_millis(parse(READ_WRITE_TIMEOUT_MS, value)?)
            }
            INACTIVITY_TIMEOUT_SECS => {
                self.inactivity_timeout =
                    Duration::from_secs(parse(INACTIVITY_TIMEOUT_SECS, value)?)
            }
            MAX_PEERS => self.max_peers = parse(MAX_PEERS, value)?,
            TRACKER_RETRY_ATTEMPTS => {
                self.tracker_retry_attempts = parse(TRACKER_RETRY_ATTEMPTS, value)?
            }
            TRACKER_RETRY_PAUSE_SECS => {
                self.tracker_retry_pause =
                    Duration::from_secs(parse(TRACKER_RETRY_PAUSE_SECS, value)?)
            }
            SESSION_RETRY_ATTEMPTS => {
                self.session_retry_attempts = parse(SESSION_RETRY_ATTEMPTS, value)?
            }
            other => return Err(CfgError::UnknownSetting(other.to_string())),
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(setting: &'static str, value: &str) -> Result<T, CfgError> {
    value.trim().parse().map_err(|_| CfgError::InvalidValue {
        setting,
        value: value.to_string(),
    })
}
