// crates/server/src/config.rs
//! Server configuration, read from the environment once at startup.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::jobs::ManagerConfig;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MEDIADROP_API_KEY must be set to a non-empty value")]
    MissingApiKey,

    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Everything the binary needs to start serving.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub api_key: String,
    pub download_dir: PathBuf,
    pub retention: Duration,
    /// Age after which finished job records are swept from the table.
    pub record_ttl: Duration,
    pub poll_interval: Duration,
    /// Drop the job record together with its expired artifact.
    pub purge_after_expiry: bool,
    pub delete_partials_on_failure: bool,
    /// Delete pending artifacts right away on shutdown.
    pub flush_on_shutdown: bool,
    pub ytdlp_bin: String,
    pub cookies_file: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("MEDIADROP_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let port = match get("MEDIADROP_PORT") {
            Some(v) => parse("MEDIADROP_PORT", v, "expected a port number")?,
            None => match get("PORT") {
                Some(v) => parse("PORT", v, "expected a port number")?,
                None => DEFAULT_PORT,
            },
        };

        let bind = match get("MEDIADROP_BIND") {
            Some(v) => parse("MEDIADROP_BIND", v, "expected an IP address")?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let retention = match get("MEDIADROP_RETENTION_SECS") {
            Some(v) => Duration::from_secs(parse("MEDIADROP_RETENTION_SECS", v, "expected seconds")?),
            None => crate::jobs::expiry::DEFAULT_RETENTION,
        };

        let record_ttl = match get("MEDIADROP_RECORD_TTL_SECS") {
            Some(v) => {
                let secs: u64 = parse("MEDIADROP_RECORD_TTL_SECS", v.clone(), "expected seconds")?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        var: "MEDIADROP_RECORD_TTL_SECS",
                        value: v,
                        reason: "must be greater than zero",
                    });
                }
                Duration::from_secs(secs)
            }
            None => crate::jobs::expiry::DEFAULT_RECORD_TTL,
        };

        let poll_interval = match get("MEDIADROP_POLL_INTERVAL_MS") {
            Some(v) => {
                let ms: u64 = parse("MEDIADROP_POLL_INTERVAL_MS", v.clone(), "expected milliseconds")?;
                if ms == 0 {
                    return Err(ConfigError::Invalid {
                        var: "MEDIADROP_POLL_INTERVAL_MS",
                        value: v,
                        reason: "must be greater than zero",
                    });
                }
                Duration::from_millis(ms)
            }
            None => crate::jobs::stream::DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            bind,
            port,
            api_key,
            download_dir: get("MEDIADROP_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("downloads")),
            retention,
            record_ttl,
            poll_interval,
            purge_after_expiry: flag(&get, "MEDIADROP_PURGE_AFTER_EXPIRY", false)?,
            delete_partials_on_failure: flag(&get, "MEDIADROP_DELETE_PARTIALS_ON_FAILURE", true)?,
            flush_on_shutdown: flag(&get, "MEDIADROP_FLUSH_ON_SHUTDOWN", true)?,
            ytdlp_bin: get("MEDIADROP_YTDLP_BIN").unwrap_or_else(|| "yt-dlp".to_string()),
            cookies_file: get("MEDIADROP_COOKIES_FILE").map(PathBuf::from),
            static_dir: get("STATIC_DIR").map(PathBuf::from),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// How old a finished record must be before the sweeper drops it.
    /// Never shorter than the retention window, so a record outlives its
    /// artifact.
    pub fn sweep_after(&self) -> Duration {
        self.record_ttl.max(self.retention)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            download_dir: self.download_dir.clone(),
            retention: self.retention,
            poll_interval: self.poll_interval,
            delete_partials_on_failure: self.delete_partials_on_failure,
        }
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: String, reason: &'static str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid { var, value, reason })
}

fn flag<G>(get: &G, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value: v,
                reason: "expected true or false",
            }),
        },
    }
}
