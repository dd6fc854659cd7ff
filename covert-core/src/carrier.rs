//! Carrier variants: how chunks leave the sender, and at what pace.
//!
//! A carrier turns a prepared chunk queue into emissions for the host to
//! execute. Direct hands everything to the transport at once; tunnel and
//! the two steganographic carriers drain one chunk per timer tick. The
//! host owns the clock and calls `tick` with a monotonic millisecond time.

use std::collections::VecDeque;
use std::fmt;

use crate::config::{Config, Method};
use crate::protocol::{EndpointMessage, TunnelIq};
use crate::wire::{self, StreamFrame};

/// Embedding opportunity cadence for the stream carriers (30 fps).
pub const FRAME_INTERVAL_MS: u64 = 1000 / 30;

/// Which local media track a steganographic carrier rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// What the hosting runtime reports it can embed into. Queried once, when
/// a transfer starts; a carrier whose track is unsupported never emits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackSupport {
    pub video: bool,
    pub audio: bool,
}

impl TrackSupport {
    pub fn all() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }

    fn supports(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Video => self.video,
            TrackKind::Audio => self.audio,
        }
    }
}

/// One side effect for the host to perform against a peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// Send a structured message over the endpoint channel.
    Endpoint(EndpointMessage),
    /// Send a tunnel ping/pong IQ.
    Tunnel(TunnelIq),
    /// Embed bytes into the local track at the next opportunity.
    Embed(TrackKind, Vec<u8>),
}

#[derive(Debug, thiserror::Error)]
pub enum CarrierError {
    /// The platform cannot embed into the required track.
    #[error("steganographic embedding not supported on the {0} track")]
    Unsupported(TrackKind),
    #[error(transparent)]
    Frame(#[from] wire::FrameEncodeError),
}

#[derive(Debug)]
enum Pacing {
    /// Everything already emitted at start.
    Done,
    Tunnel {
        queue: VecDeque<String>,
        interval_ms: u64,
        next_due_ms: u64,
    },
    Stream {
        track: TrackKind,
        queue: VecDeque<Vec<u8>>,
        next_due_ms: u64,
    },
}

/// Sender half of one carrier, loaded with the transfer's chunk queue.
#[derive(Debug)]
pub struct Carrier {
    session: String,
    pacing: Pacing,
    drained: bool,
}

impl Carrier {
    /// Build the carrier for `config.method` and return it together with the
    /// emissions due immediately. The direct carrier emits its whole queue
    /// and the end marker here; paced carriers arm their timer and wait for
    /// ticks.
    pub fn start(
        config: &Config,
        session: &str,
        chunks: Vec<String>,
        tracks: &TrackSupport,
        now_ms: u64,
    ) -> Result<(Self, Vec<Emission>), CarrierError> {
        log::debug!(
            "method {} used for session {session} ({} chunks)",
            config.method,
            chunks.len()
        );
        match config.method {
            Method::Direct => {
                let mut emissions: Vec<Emission> = chunks
                    .into_iter()
                    .map(|c| Emission::Endpoint(EndpointMessage::chunk(c)))
                    .collect();
                emissions.push(Emission::Endpoint(EndpointMessage::end_of(session.to_string())));
                Ok((
                    Self {
                        session: session.to_string(),
                        pacing: Pacing::Done,
                        drained: true,
                    },
                    emissions,
                ))
            }
            Method::Tunnel => Ok((
                Self {
                    session: session.to_string(),
                    pacing: Pacing::Tunnel {
                        queue: chunks.into(),
                        interval_ms: config.ping_interval_ms,
                        next_due_ms: now_ms + config.ping_interval_ms,
                    },
                    drained: false,
                },
                Vec::new(),
            )),
            Method::Video | Method::Audio => {
                let track = match config.method {
                    Method::Video => TrackKind::Video,
                    _ => TrackKind::Audio,
                };
                if !tracks.supports(track) {
                    return Err(CarrierError::Unsupported(track));
                }
                let mut queue = VecDeque::with_capacity(chunks.len() + 1);
                for chunk in chunks {
                    queue.push_back(wire::encode_frame(&StreamFrame::Chunk(chunk))?);
                }
                queue.push_back(wire::encode_frame(&StreamFrame::End)?);
                Ok((
                    Self {
                        session: session.to_string(),
                        pacing: Pacing::Stream {
                            track,
                            queue,
                            next_due_ms: now_ms + FRAME_INTERVAL_MS,
                        },
                        drained: false,
                    },
                    Vec::new(),
                ))
            }
        }
    }

    /// Emissions that have come due by `now_ms`: one queue pop per elapsed
    /// interval, never more. The tunnel carrier follows its last chunk with
    /// the end marker on the next tick; the stream carriers end with the
    /// final embedded frame.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Emission> {
        let mut emissions = Vec::new();
        match &mut self.pacing {
            Pacing::Done => {}
            Pacing::Tunnel {
                queue,
                interval_ms,
                next_due_ms,
            } => {
                while !self.drained && now_ms >= *next_due_ms {
                    *next_due_ms += *interval_ms;
                    match queue.pop_front() {
                        Some(data) => {
                            emissions
                                .push(Emission::Tunnel(TunnelIq::ping(self.session.clone(), data)));
                        }
                        None => {
                            emissions.push(Emission::Endpoint(EndpointMessage::end_of(
                                self.session.clone(),
                            )));
                            self.drained = true;
                        }
                    }
                }
            }
            Pacing::Stream {
                track,
                queue,
                next_due_ms,
            } => {
                while !self.drained && now_ms >= *next_due_ms {
                    *next_due_ms += FRAME_INTERVAL_MS;
                    match queue.pop_front() {
                        Some(frame) => emissions.push(Emission::Embed(*track, frame)),
                        None => self.drained = true,
                    }
                    if queue.is_empty() {
                        self.drained = true;
                    }
                }
            }
        }
        emissions
    }

    /// True once every chunk and the end marker have been emitted.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn session(&self) -> &str {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::decode_frame;

    fn chunks() -> Vec<String> {
        vec!["ABCD".into(), "EFGH".into(), "IJ".into()]
    }

    #[test]
    fn direct_emits_all_chunks_then_end() {
        let cfg = Config {
            method: Method::Direct,
            ..Config::default()
        };
        let (carrier, emissions) =
            Carrier::start(&cfg, "s", chunks(), &TrackSupport::default(), 0).unwrap();
        assert!(carrier.is_drained());
        assert_eq!(emissions.len(), 4);
        for (i, expected) in ["ABCD", "EFGH", "IJ"].iter().enumerate() {
            match &emissions[i] {
                Emission::Endpoint(msg) => {
                    assert_eq!(msg.payload.as_deref(), Some(*expected));
                    assert!(!msg.is_end);
                }
                other => panic!("unexpected emission {other:?}"),
            }
        }
        match &emissions[3] {
            Emission::Endpoint(msg) => {
                assert!(msg.is_end);
                let cfg = msg.config.as_ref().unwrap();
                assert_eq!(cfg.session.as_deref(), Some("s"));
            }
            other => panic!("unexpected emission {other:?}"),
        }
    }

    #[test]
    fn tunnel_pops_one_chunk_per_interval() {
        let cfg = Config {
            method: Method::Tunnel,
            ping_interval_ms: 100,
            ..Config::default()
        };
        let (mut carrier, initial) =
            Carrier::start(&cfg, "s1", chunks(), &TrackSupport::default(), 0).unwrap();
        assert!(initial.is_empty());

        // Nothing due before the first interval elapses.
        assert!(carrier.tick(99).is_empty());

        let first = carrier.tick(100);
        assert_eq!(first.len(), 1);
        match &first[0] {
            Emission::Tunnel(iq) => {
                assert_eq!(iq.namespace, "s1");
                assert_eq!(iq.data.as_deref(), Some("ABCD"));
            }
            other => panic!("unexpected emission {other:?}"),
        }

        assert_eq!(carrier.tick(200).len(), 1);
        assert_eq!(carrier.tick(300).len(), 1);
        assert!(!carrier.is_drained());

        // Queue empty: the next tick carries the end marker, named after
        // the session so the receiver can route it without a peer lookup.
        let end = carrier.tick(400);
        assert_eq!(end.len(), 1);
        match &end[0] {
            Emission::Endpoint(m) => {
                assert!(m.is_end);
                let named = m.config.as_ref().and_then(|c| c.session.as_deref());
                assert_eq!(named, Some("s1"));
            }
            other => panic!("unexpected emission {other:?}"),
        }
        assert!(carrier.is_drained());
        assert!(carrier.tick(500).is_empty());
    }

    #[test]
    fn tunnel_catches_up_after_late_tick() {
        let cfg = Config {
            method: Method::Tunnel,
            ping_interval_ms: 100,
            ..Config::default()
        };
        let (mut carrier, _) =
            Carrier::start(&cfg, "s1", chunks(), &TrackSupport::default(), 0).unwrap();
        // Three intervals elapsed at once: three pops, still paced per interval.
        let emissions = carrier.tick(300);
        assert_eq!(emissions.len(), 3);
        assert!(!carrier.is_drained());
    }

    #[test]
    fn video_requires_track_support() {
        let cfg = Config {
            method: Method::Video,
            ..Config::default()
        };
        let err = Carrier::start(&cfg, "s", chunks(), &TrackSupport::default(), 0).unwrap_err();
        assert!(matches!(err, CarrierError::Unsupported(TrackKind::Video)));
    }

    #[test]
    fn audio_requires_track_support() {
        let cfg = Config {
            method: Method::Audio,
            ..Config::default()
        };
        let tracks = TrackSupport {
            video: true,
            audio: false,
        };
        let err = Carrier::start(&cfg, "s", chunks(), &tracks, 0).unwrap_err();
        assert!(matches!(err, CarrierError::Unsupported(TrackKind::Audio)));
    }

    #[test]
    fn video_embeds_one_frame_per_interval_ending_with_end_frame() {
        let cfg = Config {
            method: Method::Video,
            ..Config::default()
        };
        let (mut carrier, initial) =
            Carrier::start(&cfg, "s", chunks(), &TrackSupport::all(), 0).unwrap();
        assert!(initial.is_empty());

        let mut frames = Vec::new();
        let mut now = 0;
        while !carrier.is_drained() {
            now += FRAME_INTERVAL_MS;
            for emission in carrier.tick(now) {
                match emission {
                    Emission::Embed(TrackKind::Video, bytes) => {
                        let (frame, _) = decode_frame(&bytes).unwrap();
                        frames.push(frame);
                    }
                    other => panic!("unexpected emission {other:?}"),
                }
            }
        }
        assert_eq!(
            frames,
            vec![
                StreamFrame::Chunk("ABCD".into()),
                StreamFrame::Chunk("EFGH".into()),
                StreamFrame::Chunk("IJ".into()),
                StreamFrame::End,
            ]
        );
    }
}
