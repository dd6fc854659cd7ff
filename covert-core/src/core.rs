//! Host-driven coordinator: the hosting runtime passes inbound events and
//! executes the returned actions. The core performs no I/O and owns no
//! timers; the host calls [`CovertCore::tick`] with a monotonic clock to
//! advance the paced carriers.
//!
//! One `CovertCore` per conference participant. Callers must serialize
//! access (the methods take `&mut self`); transfers with distinct session
//! names are otherwise fully independent.

use std::collections::HashMap;

use crate::carrier::{Emission, TrackKind, TrackSupport};
use crate::config::{generate_session_name, Config};
use crate::protocol::{Direction, EndpointMessage, IqKind, TunnelIq};
use crate::session::{CompletedTransfer, ReceiverSession, SendError, SenderSession};
use crate::wire::StreamFrame;

/// Action for the host to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    /// Send a structured message to the peer over the endpoint channel.
    SendEndpoint(String, EndpointMessage),
    /// Send a tunnel ping or pong IQ to the peer.
    SendTunnelIq(String, TunnelIq),
    /// Embed bytes into the local media track at the next opportunity.
    Embed(TrackKind, Vec<u8>),
    /// A receive-side transfer completed; payload and configuration.
    Completed(CompletedTransfer),
    /// The peer asked us to start sending with this configuration. The host
    /// gathers the payload and calls [`CovertCore::send_all`] with it.
    StartRequested { peer: String, config: Config },
}

fn emission_action(peer: &str, emission: Emission) -> OutboundAction {
    match emission {
        Emission::Endpoint(msg) => OutboundAction::SendEndpoint(peer.to_string(), msg),
        Emission::Tunnel(iq) => OutboundAction::SendTunnelIq(peer.to_string(), iq),
        Emission::Embed(track, bytes) => OutboundAction::Embed(track, bytes),
    }
}

/// Main coordinator for one participant. Holds the sender sessions it is
/// draining and the receiver sessions it is accumulating, keyed by session
/// name.
pub struct CovertCore {
    tracks: TrackSupport,
    senders: HashMap<String, SenderSession>,
    receivers: HashMap<String, ReceiverSession>,
    /// Active inbound session per peer. Endpoint replies and stream bytes
    /// carry no session name, so they route through the peer that the last
    /// announcement came from; tunnel pings route by namespace instead.
    routes: HashMap<String, String>,
}

impl CovertCore {
    pub fn new(tracks: TrackSupport) -> Self {
        Self {
            tracks,
            senders: HashMap::new(),
            receivers: HashMap::new(),
            routes: HashMap::new(),
        }
    }

    /// Update what the platform reports it can embed into. Checked at the
    /// start of each steganographic transfer.
    pub fn set_track_support(&mut self, tracks: TrackSupport) {
        self.tracks = tracks;
    }

    /// Start a transfer of `payload` to `peer`. Fatal errors (invalid
    /// configuration, unusable cipher material, unsupported carrier) come
    /// back before anything is emitted. Returns the actions due now; paced
    /// carriers produce the rest through [`tick`](Self::tick).
    pub fn send_all(
        &mut self,
        peer: &str,
        mut config: Config,
        payload: &str,
        now_ms: u64,
    ) -> Result<Vec<OutboundAction>, SendError> {
        config.validate()?;
        let name = config
            .session
            .clone()
            .unwrap_or_else(|| config.new_session_name());
        if self.senders.get(&name).is_some_and(|s| !s.is_ended()) {
            return Err(SendError::SessionActive(name));
        }
        config.session = Some(name.clone());

        let (session, emissions) =
            SenderSession::start(peer, config, payload, &self.tracks, now_ms)?;
        let actions = emissions
            .into_iter()
            .map(|e| emission_action(peer, e))
            .collect();
        if !session.is_ended() {
            self.senders.insert(name, session);
        }
        Ok(actions)
    }

    /// Pull-style trigger: ask `peer` to start sending to us with `config`.
    pub fn request_extraction(
        &mut self,
        peer: &str,
        config: Config,
    ) -> Result<Vec<OutboundAction>, SendError> {
        config.validate()?;
        Ok(vec![OutboundAction::SendEndpoint(
            peer.to_string(),
            EndpointMessage::request(config),
        )])
    }

    /// Process one inbound endpoint message. Recoverable problems (chunks
    /// for unknown or ended sessions, bad announcements) are logged and
    /// dropped; they never abort other transfers.
    pub fn on_endpoint_message(&mut self, peer: &str, msg: EndpointMessage) -> Vec<OutboundAction> {
        match msg.extraction {
            Direction::Request => {
                let config = match msg.config {
                    Some(c) => c,
                    None => {
                        log::warn!("extraction request from {peer} without configuration");
                        return Vec::new();
                    }
                };
                if let Err(e) = config.validate() {
                    log::warn!("extraction request from {peer} rejected: {e}");
                    return Vec::new();
                }
                vec![OutboundAction::StartRequested {
                    peer: peer.to_string(),
                    config,
                }]
            }
            Direction::Reply => self.on_reply(peer, msg),
        }
    }

    fn on_reply(&mut self, peer: &str, msg: EndpointMessage) -> Vec<OutboundAction> {
        if msg.is_end {
            let named = msg.config.as_ref().and_then(|c| c.session.clone());
            return self.on_end_marker(peer, named.as_deref());
        }

        // Session announcement: carries the name and, when encrypted, the
        // cipher material. Creates or refreshes the receiver session.
        if let Some(config) = msg.config {
            let name = config
                .session
                .clone()
                .unwrap_or_else(generate_session_name);
            match self.receivers.get_mut(&name) {
                Some(session) if !session.is_ended() => session.adopt_config(config),
                _ => {
                    self.receivers.insert(
                        name.clone(),
                        ReceiverSession::new(name.clone(), peer.to_string(), config),
                    );
                }
            }
            self.routes.insert(peer.to_string(), name);
            return Vec::new();
        }

        if let Some(chunk) = msg.payload {
            let name = self.route_for(peer);
            if let Some(session) = self.receivers.get_mut(&name) {
                session.append_chunk(&chunk);
            }
        }
        Vec::new()
    }

    /// An end marker naming its session completes that session directly;
    /// an unnamed one (or a name never seen) falls back to the peer route.
    /// Named routing keeps concurrent transfers from one peer independent.
    fn on_end_marker(&mut self, peer: &str, named: Option<&str>) -> Vec<OutboundAction> {
        let name = match named {
            Some(n) if self.receivers.contains_key(n) => n.to_string(),
            _ => match self.routes.remove(peer) {
                Some(n) => n,
                None => {
                    log::warn!("end marker from {peer} with no active session");
                    return Vec::new();
                }
            },
        };
        self.routes.retain(|_, n| n != &name);
        self.complete_session(&name)
    }

    /// Process one inbound tunnel IQ. A ping appends its chunk to the
    /// session named by the namespace (created on first contact if the
    /// announcement has not arrived) and is acknowledged with a pong.
    pub fn on_tunnel_ping(&mut self, peer: &str, iq: TunnelIq) -> Vec<OutboundAction> {
        match iq.kind {
            IqKind::Get => {
                let session = self
                    .receivers
                    .entry(iq.namespace.clone())
                    .or_insert_with(|| {
                        ReceiverSession::new(
                            iq.namespace.clone(),
                            peer.to_string(),
                            Config::default(),
                        )
                    });
                if let Some(data) = iq.data {
                    session.append_chunk(&data);
                }
                vec![OutboundAction::SendTunnelIq(
                    peer.to_string(),
                    TunnelIq::pong(iq.namespace),
                )]
            }
            IqKind::Result => {
                // Pong acknowledgement; the queue keeps draining regardless.
                log::trace!("pong for session {} from {peer}", iq.namespace);
                Vec::new()
            }
        }
    }

    /// Feed bytes the host decoded out of the peer's video or audio stream.
    /// Corrupt frames are logged and dropped without aborting the session.
    pub fn on_stream_bytes(&mut self, peer: &str, bytes: &[u8]) -> Vec<OutboundAction> {
        let name = self.route_for(peer);
        let Some(session) = self.receivers.get_mut(&name) else {
            return Vec::new();
        };
        let frames = match session.push_stream_bytes(bytes) {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!("session {name}: stream frame dropped: {e}");
                return Vec::new();
            }
        };
        let mut actions = Vec::new();
        let mut ended = false;
        for frame in frames {
            match frame {
                StreamFrame::Chunk(chunk) => session.append_chunk(&chunk),
                StreamFrame::End => {
                    ended = true;
                    break;
                }
            }
        }
        if ended {
            self.routes.retain(|_, n| n != &name);
            actions.extend(self.complete_session(&name));
        }
        actions
    }

    /// Advance the paced carriers to `now_ms` and collect everything that
    /// came due. Drained sender sessions are dropped; their names become
    /// eligible for new transfers.
    pub fn tick(&mut self, now_ms: u64) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        for session in self.senders.values_mut() {
            let peer = session.peer().to_string();
            for emission in session.tick(now_ms) {
                actions.push(emission_action(&peer, emission));
            }
        }
        self.senders.retain(|_, s| !s.is_ended());
        actions
    }

    /// Session names with an in-flight outbound queue.
    pub fn active_sends(&self) -> Vec<&str> {
        self.senders.keys().map(String::as_str).collect()
    }

    /// The host reports that an outbound send failed. The core never
    /// retries; a paced queue keeps draining on subsequent ticks and any
    /// retry policy belongs to the transport itself.
    pub fn on_transport_failure(&self, peer: &str, detail: &str) {
        log::warn!("transport failure towards {peer}: {detail}");
    }

    fn complete_session(&mut self, name: &str) -> Vec<OutboundAction> {
        let Some(mut session) = self.receivers.remove(name) else {
            log::warn!("end marker for unknown session {name}");
            return Vec::new();
        };
        match session.complete() {
            Some(done) => vec![OutboundAction::Completed(done)],
            None => Vec::new(),
        }
    }

    /// Inbound session name for `peer`, creating one on first contact when
    /// chunks arrive before (or without) an announcement.
    fn route_for(&mut self, peer: &str) -> String {
        if let Some(name) = self.routes.get(peer) {
            return name.clone();
        }
        let name = generate_session_name();
        log::debug!("first inbound chunk from {peer}; new session {name}");
        self.receivers.insert(
            name.clone(),
            ReceiverSession::new(name.clone(), peer.to_string(), Config::default()),
        );
        self.routes.insert(peer.to_string(), name.clone());
        name
    }
}

impl Default for CovertCore {
    fn default() -> Self {
        Self::new(TrackSupport::default())
    }
}
