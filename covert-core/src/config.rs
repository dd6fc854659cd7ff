//! Transfer configuration: carrier method, chunking, pacing, encryption flags.

use std::fmt;
use std::str::FromStr;

use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};

/// Well-known session name used when `debug` is set.
pub const DEBUG_SESSION_NAME: &str = "extraction";

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Default pacing interval for interval-driven carriers, in milliseconds.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 1000;

/// Length of a randomly generated session name.
const SESSION_NAME_LEN: usize = 9;

/// Carrier selection. Dispatch is a plain match on this enum; an
/// unrecognized method string fails at parse time, before any transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// One endpoint message per chunk, no pacing.
    Direct,
    /// Chunks embedded into the local video stream, one per frame interval.
    Video,
    /// Chunks mixed into an auxiliary audio stream, one per frame interval.
    Audio,
    /// One chunk per ping request at `ping_interval_ms` cadence.
    Tunnel,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Direct => "direct",
            Method::Video => "video",
            Method::Audio => "audio",
            Method::Tunnel => "tunnel",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Method::Direct),
            "video" => Ok(Method::Video),
            "audio" => Ok(Method::Audio),
            "tunnel" => Ok(Method::Tunnel),
            other => Err(ConfigError::UnknownMethod(other.to_string())),
        }
    }
}

/// Immutable-after-start transfer configuration. Unset fields take the
/// documented defaults; unknown fields on the wire are ignored.
///
/// `session`, `key` and `iv` are filled in by the protocol itself: the
/// session-open announcement carries the session name and, for encrypted
/// transfers, the base64 cipher material, so the receiving side can demux
/// and decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_method")]
    pub method: Method,
    /// Application-level tag; not interpreted by the protocol.
    #[serde(default = "default_data_kind")]
    pub data_kind: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_encryption_enabled")]
    pub encryption_enabled: bool,
    #[serde(default = "default_ping_interval", rename = "pingInterval")]
    pub ping_interval_ms: u64,
    /// If true the session name is the well-known constant instead of a
    /// random token.
    #[serde(default)]
    pub debug: bool,
    /// Session name, set on the announcement by the sending side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Base64 AEAD key, present only on an encrypted transfer's announcement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Base64 AEAD nonce, paired with `key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
}

fn default_method() -> Method {
    Method::Direct
}

fn default_data_kind() -> String {
    "cookies".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_encryption_enabled() -> bool {
    true
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            method: default_method(),
            data_kind: default_data_kind(),
            chunk_size: default_chunk_size(),
            encryption_enabled: default_encryption_enabled(),
            ping_interval_ms: default_ping_interval(),
            debug: false,
            session: None,
            key: None,
            iv: None,
        }
    }
}

impl Config {
    /// Validate the fields a transfer cannot start without. Called once at
    /// session construction; nothing downstream re-checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ChunkSize);
        }
        if self.ping_interval_ms == 0 {
            return Err(ConfigError::PingInterval);
        }
        Ok(())
    }

    /// Session name for a new transfer: the well-known constant in debug
    /// mode, otherwise a random lowercase token.
    pub fn new_session_name(&self) -> String {
        if self.debug {
            DEBUG_SESSION_NAME.to_string()
        } else {
            generate_session_name()
        }
    }

    /// Whether encryption is usable: enabled and both key and iv present.
    /// Anything less falls back to plaintext.
    pub fn encryption_usable(&self) -> bool {
        self.encryption_enabled && self.key.is_some() && self.iv.is_some()
    }
}

/// Random lowercase alphanumeric session name.
pub fn generate_session_name() -> String {
    Alphanumeric
        .sample_string(&mut rand::thread_rng(), SESSION_NAME_LEN)
        .to_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("chunk size must be positive")]
    ChunkSize,
    #[error("ping interval must be positive")]
    PingInterval,
    #[error("unknown carrier method `{0}`")]
    UnknownMethod(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.method, Method::Direct);
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.ping_interval_ms, DEFAULT_PING_INTERVAL_MS);
        assert!(cfg.encryption_enabled);
        assert!(!cfg.debug);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let cfg = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ChunkSize)));
    }

    #[test]
    fn zero_ping_interval_rejected() {
        let cfg = Config {
            ping_interval_ms: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::PingInterval)));
    }

    #[test]
    fn unknown_method_fails_parse() {
        let err = "bogus".parse::<Method>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMethod(m) if m == "bogus"));
    }

    #[test]
    fn method_parse_roundtrip() {
        for m in [Method::Direct, Method::Video, Method::Audio, Method::Tunnel] {
            assert_eq!(m.as_str().parse::<Method>().unwrap(), m);
        }
    }

    #[test]
    fn debug_name_is_constant() {
        let cfg = Config {
            debug: true,
            ..Config::default()
        };
        assert_eq!(cfg.new_session_name(), DEBUG_SESSION_NAME);
    }

    #[test]
    fn random_names_differ() {
        let cfg = Config::default();
        let a = cfg.new_session_name();
        let b = cfg.new_session_name();
        assert_eq!(a.len(), 9);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(a, b);
    }

    #[test]
    fn encryption_usable_needs_both_parts() {
        let mut cfg = Config::default();
        assert!(!cfg.encryption_usable());
        cfg.key = Some("k".into());
        assert!(!cfg.encryption_usable());
        cfg.iv = Some("n".into());
        assert!(cfg.encryption_usable());
        cfg.encryption_enabled = false;
        assert!(!cfg.encryption_usable());
    }
}
