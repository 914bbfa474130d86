// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults and the loader used at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `multisig.redb` | `./data` |
//! | `CHAIN_ID` | Chain id every signed document must declare | `cosmoshub-4` |
//! | `CHAIN_REST_URL` | LCD endpoint used for broadcast | `http://localhost:1317` |
//! | `EXPLORER_URL` | Base URL for transaction explorer links | `https://www.mintscan.io/cosmos/tx` |
//! | `LOCK_TIMEOUT_MS` | Per-transaction lock acquisition timeout | `20000` |
//! | `BROADCAST_TIMEOUT_SECS` | HTTP timeout of one broadcast call | `15` |
//! | `BROADCAST_RETRY_INTERVAL_SECS` | Interval of the broadcast retry poller | `30` |
//! | `BROADCAST_MAX_RETRIES` | Automatic retries per transaction; `0` disables the poller | `0` |
//! | `BROADCAST_MODE` | LCD broadcast mode (`sync`, `async`, `block`) | `sync` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::blockchain::BroadcastMode;
use crate::signing::CoordinatorSettings;

/// Environment variable name for the data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Environment variable name for the expected chain id.
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";
pub const DEFAULT_CHAIN_ID: &str = "cosmoshub-4";

/// Environment variable name for the LCD REST endpoint.
pub const CHAIN_REST_URL_ENV: &str = "CHAIN_REST_URL";
pub const DEFAULT_CHAIN_REST_URL: &str = "http://localhost:1317";

/// Environment variable name for the explorer base URL.
///
/// Explorer links are rendered as `{EXPLORER_URL}/{chain_tx_hash}`.
pub const EXPLORER_URL_ENV: &str = "EXPLORER_URL";
pub const DEFAULT_EXPLORER_URL: &str = "https://www.mintscan.io/cosmos/tx";

/// Environment variable name for the lock acquisition timeout.
///
/// The lock is held for the whole broadcast call, so this must exceed
/// `BROADCAST_TIMEOUT_SECS`; otherwise a same-id request arriving during a
/// slow broadcast fails with `LockTimeout`. Loading rejects such a pair.
pub const LOCK_TIMEOUT_MS_ENV: &str = "LOCK_TIMEOUT_MS";
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 20_000;

pub const BROADCAST_TIMEOUT_SECS_ENV: &str = "BROADCAST_TIMEOUT_SECS";
pub const DEFAULT_BROADCAST_TIMEOUT_SECS: u64 = 15;

pub const BROADCAST_RETRY_INTERVAL_SECS_ENV: &str = "BROADCAST_RETRY_INTERVAL_SECS";
pub const DEFAULT_BROADCAST_RETRY_INTERVAL_SECS: u64 = 30;

/// Environment variable name for the automatic retry limit.
///
/// Only failures known not to have reached the chain are retried. Timeouts
/// and 5xx responses always wait for a manual retry.
pub const BROADCAST_MAX_RETRIES_ENV: &str = "BROADCAST_MAX_RETRIES";
pub const DEFAULT_BROADCAST_MAX_RETRIES: u32 = 0;

pub const BROADCAST_MODE_ENV: &str = "BROADCAST_MODE";

/// Environment variable name for log output format.
///
/// - `json`: Structured JSON logs (production)
/// - `pretty`: Human-readable logs (development)
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Snapshot cache sizing.
pub const SNAPSHOT_CACHE_CAPACITY: usize = 256;
pub const SNAPSHOT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is set but empty")]
    Empty { name: &'static str },

    #[error("{name} is out of range or not an integer: `{value}`")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} is not a valid URL: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("{name} has unsupported value `{value}`")]
    Unsupported { name: &'static str, value: String },

    #[error("LOCK_TIMEOUT_MS ({lock:?}) must exceed BROADCAST_TIMEOUT_SECS ({broadcast:?})")]
    LockShorterThanBroadcast { lock: Duration, broadcast: Duration },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Fully resolved process configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub data_dir: PathBuf,
    pub chain_id: String,
    pub chain_rest_url: Url,
    pub explorer_url: String,
    pub lock_timeout: Duration,
    pub broadcast_timeout: Duration,
    pub broadcast_retry_interval: Duration,
    pub broadcast_max_retries: u32,
    pub broadcast_mode: BroadcastMode,
    pub log_format: LogFormat,
}

impl CoordinatorConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names. Unset variables take
    /// their defaults; set-but-invalid values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &'static str, default: &str| -> Result<String, ConfigError> {
            match lookup(name) {
                None => Ok(default.to_string()),
                Some(value) if value.trim().is_empty() => Err(ConfigError::Empty { name }),
                Some(value) => Ok(value.trim().to_string()),
            }
        };
        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(value) => match value.trim().parse::<u64>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(ConfigError::InvalidNumber { name, value }),
                },
            }
        };
        let count = |name: &'static str, default: u32| -> Result<u32, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidNumber { name, value }),
            }
        };

        let chain_rest_url = text(CHAIN_REST_URL_ENV, DEFAULT_CHAIN_REST_URL)?;
        let chain_rest_url = Url::parse(&chain_rest_url).map_err(|e| ConfigError::InvalidUrl {
            name: CHAIN_REST_URL_ENV,
            reason: e.to_string(),
        })?;

        let explorer_url = text(EXPLORER_URL_ENV, DEFAULT_EXPLORER_URL)?;
        Url::parse(&explorer_url).map_err(|e| ConfigError::InvalidUrl {
            name: EXPLORER_URL_ENV,
            reason: e.to_string(),
        })?;

        let mode = text(BROADCAST_MODE_ENV, "sync")?;
        let broadcast_mode = BroadcastMode::parse(&mode).ok_or(ConfigError::Unsupported {
            name: BROADCAST_MODE_ENV,
            value: mode,
        })?;

        let format = text(LOG_FORMAT_ENV, "pretty")?;
        let log_format = match format.to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => {
                return Err(ConfigError::Unsupported {
                    name: LOG_FORMAT_ENV,
                    value: format,
                })
            }
        };

        let lock_timeout =
            Duration::from_millis(number(LOCK_TIMEOUT_MS_ENV, DEFAULT_LOCK_TIMEOUT_MS)?);
        let broadcast_timeout = Duration::from_secs(number(
            BROADCAST_TIMEOUT_SECS_ENV,
            DEFAULT_BROADCAST_TIMEOUT_SECS,
        )?);
        if lock_timeout <= broadcast_timeout {
            return Err(ConfigError::LockShorterThanBroadcast {
                lock: lock_timeout,
                broadcast: broadcast_timeout,
            });
        }

        Ok(Self {
            data_dir: PathBuf::from(text(DATA_DIR_ENV, DEFAULT_DATA_DIR)?),
            chain_id: text(CHAIN_ID_ENV, DEFAULT_CHAIN_ID)?,
            chain_rest_url,
            explorer_url: explorer_url.trim_end_matches('/').to_string(),
            lock_timeout,
            broadcast_timeout,
            broadcast_retry_interval: Duration::from_secs(number(
                BROADCAST_RETRY_INTERVAL_SECS_ENV,
                DEFAULT_BROADCAST_RETRY_INTERVAL_SECS,
            )?),
            broadcast_max_retries: count(
                BROADCAST_MAX_RETRIES_ENV,
                DEFAULT_BROADCAST_MAX_RETRIES,
            )?,
            broadcast_mode,
            log_format,
        })
    }

    /// Path of the transaction database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("multisig.redb")
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            chain_id: self.chain_id.clone(),
            explorer_url: self.explorer_url.clone(),
            lock_timeout: self.lock_timeout,
            cache_capacity: SNAPSHOT_CACHE_CAPACITY,
            cache_ttl: SNAPSHOT_CACHE_TTL,
        }
    }
}
