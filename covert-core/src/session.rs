//! Session: one logical transfer, namespaced by a session name.
//!
//! The sender role drives cipher, chunker and carrier; the receiver role
//! owns the reassembly buffer and the completion step. Both are created
//! and routed by the coordinator in [`crate::core`].

use crate::carrier::{Carrier, CarrierError, Emission, TrackSupport};
use crate::chunker;
use crate::cipher::{self, CipherMaterial, CryptoError};
use crate::config::{Config, ConfigError};
use crate::protocol::EndpointMessage;
use crate::reassembly::ReassemblyBuffer;
use crate::wire::{FrameDecodeError, StreamDecoder, StreamFrame};

/// Sender-side transfer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Transmitting,
    Ended,
}

/// A fatal error starting a transfer. Nothing is emitted when one of these
/// comes back; the session never left the idle state.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Carrier(#[from] CarrierError),
    #[error("session `{0}` is already transmitting")]
    SessionActive(String),
}

/// Sender half of one transfer.
#[derive(Debug)]
pub struct SenderSession {
    name: String,
    peer: String,
    config: Config,
    state: SenderState,
    carrier: Carrier,
}

impl SenderSession {
    /// Start a transfer: validate configuration, settle cipher material,
    /// encrypt the whole payload, chunk it and hand the queue to the
    /// carrier. Returns the session and the emissions due immediately,
    /// beginning with the session announcement.
    ///
    /// Cipher material already present in `config` (a requester supplied
    /// it) is reused; otherwise fresh material is generated. Either way the
    /// announced configuration carries the base64 key and iv so the
    /// receiving side can decrypt.
    pub fn start(
        peer: &str,
        config: Config,
        payload: &str,
        tracks: &TrackSupport,
        now_ms: u64,
    ) -> Result<(Self, Vec<Emission>), SendError> {
        config.validate()?;
        let name = config
            .session
            .clone()
            .unwrap_or_else(|| config.new_session_name());

        let material = if config.encryption_enabled {
            if config.key.is_some() || config.iv.is_some() {
                Some(CipherMaterial::from_base64(
                    config.key.as_deref(),
                    config.iv.as_deref(),
                )?)
            } else {
                let material = CipherMaterial::generate();
                log::debug!("cipher material generated for session {name}");
                Some(material)
            }
        } else {
            None
        };

        let mut announced = config;
        announced.session = Some(name.clone());
        if let Some(m) = &material {
            announced.key = Some(m.key_base64());
            announced.iv = Some(m.iv_base64());
        }

        let wire_text = match &material {
            Some(m) => cipher::encrypt(payload, m)?,
            None => payload.to_string(),
        };
        let chunks: Vec<String> = chunker::split(&wire_text, announced.chunk_size)
            .map(str::to_string)
            .collect();

        let mut emissions = vec![Emission::Endpoint(EndpointMessage::announce(
            announced.clone(),
        ))];
        let (carrier, initial) = Carrier::start(&announced, &name, chunks, tracks, now_ms)?;
        emissions.extend(initial);

        let state = if carrier.is_drained() {
            SenderState::Ended
        } else {
            SenderState::Transmitting
        };
        Ok((
            Self {
                name,
                peer: peer.to_string(),
                config: announced,
                state,
                carrier,
            },
            emissions,
        ))
    }

    /// Paced emissions due by `now_ms`. Transitions to `Ended` once the
    /// carrier has drained the queue and the end marker is out.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Emission> {
        if self.state == SenderState::Ended {
            return Vec::new();
        }
        let emissions = self.carrier.tick(now_ms);
        if self.carrier.is_drained() {
            self.state = SenderState::Ended;
        }
        emissions
    }

    pub fn is_ended(&self) -> bool {
        self.state == SenderState::Ended
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// The payload and configuration surfaced when a receive-side transfer
/// completes.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTransfer {
    pub name: String,
    pub peer: String,
    pub payload: String,
    pub config: Config,
}

/// Receiver half of one transfer: accumulates chunks for a session name
/// until the end marker arrives.
pub struct ReceiverSession {
    name: String,
    peer: String,
    config: Config,
    buffer: ReassemblyBuffer,
    decoder: StreamDecoder,
    ended: bool,
}

impl ReceiverSession {
    pub fn new(name: String, peer: String, config: Config) -> Self {
        Self {
            name,
            peer,
            config,
            buffer: ReassemblyBuffer::new(),
            decoder: StreamDecoder::new(),
            ended: false,
        }
    }

    /// Adopt the configuration carried by a session announcement. A session
    /// created lazily from a first chunk starts with defaults; the
    /// announcement brings the real method, flags and cipher material.
    pub fn adopt_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Append one chunk in arrival order. Chunks for an ended session are
    /// dropped; a new transfer needs a new session name.
    pub fn append_chunk(&mut self, chunk: &str) {
        if self.ended {
            log::warn!(
                "dropping chunk for ended session {} from {}",
                self.name,
                self.peer
            );
            return;
        }
        self.buffer.append(chunk);
    }

    /// Feed captured stream bytes through the frame decoder.
    pub fn push_stream_bytes(&mut self, bytes: &[u8]) -> Result<Vec<StreamFrame>, FrameDecodeError> {
        self.decoder.push(bytes)
    }

    /// Process the end marker: decrypt if the session has usable material,
    /// clear the buffer and end the session. Returns `None` when decryption
    /// fails (logged, transfer yields nothing) or when the session had
    /// already ended.
    pub fn complete(&mut self) -> Option<CompletedTransfer> {
        if self.ended {
            log::warn!("duplicate end marker for session {}", self.name);
            return None;
        }
        self.ended = true;

        let wire_text = self.buffer.take();
        let payload = if self.config.encryption_usable() && !wire_text.is_empty() {
            let material = match CipherMaterial::from_base64(
                self.config.key.as_deref(),
                self.config.iv.as_deref(),
            ) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("session {}: unusable cipher material: {e}", self.name);
                    return None;
                }
            };
            match cipher::decrypt(&wire_text, &material) {
                Ok(plain) => plain,
                Err(e) => {
                    log::warn!("session {}: payload dropped, decrypt failed: {e}", self.name);
                    return None;
                }
            }
        } else {
            wire_text
        };

        Some(CompletedTransfer {
            name: self.name.clone(),
            peer: self.peer.clone(),
            payload,
            config: self.config.clone(),
        })
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Method;

    fn direct_config(encrypted: bool) -> Config {
        Config {
            method: Method::Direct,
            chunk_size: 4,
            encryption_enabled: encrypted,
            ..Config::default()
        }
    }

    fn endpoint_payloads(emissions: &[Emission]) -> Vec<String> {
        emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Endpoint(m) => m.payload.clone(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plaintext_direct_send_emits_expected_chunks() {
        let (session, emissions) = SenderSession::start(
            "attacker",
            direct_config(false),
            "ABCDEFGHIJ",
            &TrackSupport::default(),
            0,
        )
        .unwrap();
        assert!(session.is_ended());

        // Announcement first, then the chunks, then the end marker.
        match &emissions[0] {
            Emission::Endpoint(m) => {
                let cfg = m.config.as_ref().unwrap();
                assert_eq!(cfg.session.as_deref(), Some(session.name()));
                assert!(cfg.key.is_none());
            }
            other => panic!("unexpected emission {other:?}"),
        }
        assert_eq!(endpoint_payloads(&emissions), vec!["ABCD", "EFGH", "IJ"]);
        assert!(matches!(
            emissions.last(),
            Some(Emission::Endpoint(m)) if m.is_end
        ));
    }

    #[test]
    fn encrypted_send_announces_material_and_hides_plaintext() {
        let (_, emissions) = SenderSession::start(
            "attacker",
            direct_config(true),
            "ABCDEFGHIJ",
            &TrackSupport::default(),
            0,
        )
        .unwrap();
        let announced = match &emissions[0] {
            Emission::Endpoint(m) => m.config.clone().unwrap(),
            other => panic!("unexpected emission {other:?}"),
        };
        assert!(announced.key.is_some());
        assert!(announced.iv.is_some());

        let wire_chunks = endpoint_payloads(&emissions);
        assert!(!wire_chunks.is_empty());
        assert_ne!(wire_chunks.concat(), "ABCDEFGHIJ");

        // The receiver path recovers the plaintext.
        let name = announced.session.clone().unwrap();
        let mut receiver = ReceiverSession::new(name, "peer".into(), announced);
        for chunk in &wire_chunks {
            receiver.append_chunk(chunk);
        }
        let done = receiver.complete().unwrap();
        assert_eq!(done.payload, "ABCDEFGHIJ");
    }

    #[test]
    fn malformed_supplied_material_is_fatal() {
        let config = Config {
            key: Some("!!!".into()),
            iv: Some("!!!".into()),
            ..direct_config(true)
        };
        let err = SenderSession::start("attacker", config, "data", &TrackSupport::default(), 0).unwrap_err();
        assert!(matches!(err, SendError::Crypto(_)));
    }

    #[test]
    fn zero_chunk_size_never_transmits() {
        let config = Config {
            chunk_size: 0,
            ..direct_config(false)
        };
        let err = SenderSession::start("attacker", config, "data", &TrackSupport::default(), 0).unwrap_err();
        assert!(matches!(err, SendError::Config(ConfigError::ChunkSize)));
    }

    #[test]
    fn receiver_drops_chunks_after_end() {
        let mut receiver =
            ReceiverSession::new("s".into(), "peer".into(), direct_config(false));
        receiver.append_chunk("ABCD");
        let done = receiver.complete().unwrap();
        assert_eq!(done.payload, "ABCD");

        receiver.append_chunk("MORE");
        assert!(receiver.complete().is_none());
    }

    #[test]
    fn tampered_stream_yields_nothing() {
        let material = CipherMaterial::generate();
        let config = Config {
            key: Some(material.key_base64()),
            iv: Some(material.iv_base64()),
            ..direct_config(true)
        };
        let good = cipher::encrypt("secret", &material).unwrap();
        // Corrupt one character of the wire text.
        let mut corrupted = good.into_bytes();
        corrupted[0] = if corrupted[0] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(corrupted).unwrap();

        let mut receiver = ReceiverSession::new("s".into(), "peer".into(), config);
        receiver.append_chunk(&corrupted);
        assert!(receiver.complete().is_none());
        assert!(receiver.is_ended());
    }

    #[test]
    fn empty_encrypted_buffer_completes_empty() {
        let material = CipherMaterial::generate();
        let config = Config {
            key: Some(material.key_base64()),
            iv: Some(material.iv_base64()),
            ..direct_config(true)
        };
        let mut receiver = ReceiverSession::new("s".into(), "peer".into(), config);
        let done = receiver.complete().unwrap();
        assert_eq!(done.payload, "");
    }
}
