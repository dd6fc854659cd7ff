//! Covert multi-carrier exfiltration protocol reference implementation.
//! Host-driven: no I/O; the hosting conference runtime passes events and
//! receives actions.

pub mod carrier;
pub mod chunker;
pub mod cipher;
pub mod config;
pub mod protocol;
pub mod reassembly;
pub mod session;
pub mod wire;

pub mod core;

pub use carrier::{CarrierError, Emission, TrackKind, TrackSupport};
pub use cipher::{CipherMaterial, CryptoError};
pub use config::{Config, ConfigError, Method, DEBUG_SESSION_NAME};
pub use self::core::{CovertCore, OutboundAction};
pub use protocol::{Direction, EndpointMessage, IqKind, TunnelIq};
pub use session::{CompletedTransfer, SendError};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError, StreamFrame};
