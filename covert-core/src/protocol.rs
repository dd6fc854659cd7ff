//! Structured wire messages exchanged through the hosting transport.
//!
//! The core never serializes these itself; the host moves them between
//! peers in whatever envelope the conference runtime uses. Serde derives
//! are provided so hosts with a JSON-shaped signaling channel can pass
//! them through unchanged.

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Direction tag of an endpoint message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ask the peer to begin a send in the opposite direction.
    Request,
    /// Carry chunk data, the end marker, or the session announcement.
    Reply,
}

/// One message over the endpoint channel:
/// `{ extraction: "reply"|"request", payload?, isEnd?, config? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointMessage {
    pub extraction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, rename = "isEnd")]
    pub is_end: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
}

impl EndpointMessage {
    /// Pull-style trigger: ask the peer to start sending with `config`.
    pub fn request(config: Config) -> Self {
        Self {
            extraction: Direction::Request,
            payload: None,
            is_end: false,
            config: Some(config),
        }
    }

    /// Session announcement: conveys the session name and, when encryption
    /// is on, the cipher material, before the first chunk.
    pub fn announce(config: Config) -> Self {
        Self {
            extraction: Direction::Reply,
            payload: None,
            is_end: false,
            config: Some(config),
        }
    }

    /// One chunk of wire text.
    pub fn chunk(payload: String) -> Self {
        Self {
            extraction: Direction::Reply,
            payload: Some(payload),
            is_end: false,
            config: None,
        }
    }

    /// Control message: no further chunks will arrive.
    pub fn end() -> Self {
        Self {
            extraction: Direction::Reply,
            payload: None,
            is_end: true,
            config: None,
        }
    }

    /// End marker naming its session, so a receiver multiplexing several
    /// transfers from one peer completes the right one.
    pub fn end_of(session: String) -> Self {
        Self {
            extraction: Direction::Reply,
            payload: None,
            is_end: true,
            config: Some(Config {
                session: Some(session),
                ..Config::default()
            }),
        }
    }
}

/// IQ kind of a tunnel-ping message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IqKind {
    /// Outbound ping carrying one chunk.
    Get,
    /// Pong acknowledgement.
    Result,
}

/// One tunnel-ping message. The session name doubles as the namespace the
/// receiver filters on, so concurrent tunnel transfers need disjoint names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelIq {
    pub kind: IqKind,
    /// Session name used to route the ping.
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl TunnelIq {
    pub fn ping(namespace: String, data: String) -> Self {
        Self {
            kind: IqKind::Get,
            namespace,
            data: Some(data),
        }
    }

    pub fn pong(namespace: String) -> Self {
        Self {
            kind: IqKind::Result,
            namespace,
            data: None,
        }
    }
}
