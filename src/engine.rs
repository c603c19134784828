// # Player Engine Contract
//
// The external player engine is consumed only through the command trait below
// and the callback events it posts back through an `EngineEventSink`. Any
// engine implementing `PlayerEngine` (plus a factory producing it) can drive a
// playback session.

use crate::playback::service::SessionMessage;
use crate::playback::state::{BandwidthSwitchMode, MediaDescriptor, PlayMode};
use crate::playback::surface::RenderTarget;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Engine is not ready to accept commands")]
    NotReady,
    #[error("Engine rejected command: {0}")]
    Rejected(String),
    #[error("Engine initialization failed: {0}")]
    Init(String),
    #[error("Engine release failed: {0}")]
    Release(String),
}

/// How the engine should continue after a resume command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeMode {
    /// Keep whatever play/pause state the engine had before suspending
    Keep,
    Play,
    Pause,
}

/// Commands accepted by a player engine.
///
/// Commands are only ever issued from the session owner task, one at a time.
/// Sampling methods are cheap reads of engine-side counters.
pub trait PlayerEngine: Send {
    fn prepare(
        &mut self,
        descriptor: &MediaDescriptor,
        start_position_millis: u64,
    ) -> Result<(), EngineError>;
    fn start(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    fn resume(&mut self, mode: ResumeMode) -> Result<(), EngineError>;
    fn suspend(&mut self) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    fn seek(&mut self, position_millis: u64) -> Result<(), EngineError>;
    /// `bitrate == 0` selects automatic adaptation
    fn set_bitrate(&mut self, bitrate: u32, smooth: bool) -> Result<(), EngineError>;
    fn set_playback_speed(&mut self, speed: f32) -> Result<(), EngineError>;
    fn set_mute(&mut self, muted: bool) -> Result<(), EngineError>;
    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError>;
    fn set_cycle_mode(&mut self, enabled: bool) -> Result<(), EngineError>;
    fn set_play_mode(&mut self, mode: PlayMode) -> Result<(), EngineError>;
    fn set_bandwidth_switch_mode(
        &mut self,
        mode: BandwidthSwitchMode,
        update_now: bool,
    ) -> Result<(), EngineError>;
    /// Whether the engine keeps downloading while paused
    fn set_buffering_status(
        &mut self,
        keep_downloading: bool,
        update_now: bool,
    ) -> Result<(), EngineError>;
    fn close_logo(&mut self) -> Result<(), EngineError>;
    fn attach_surface(&mut self, target: &RenderTarget) -> Result<(), EngineError>;
    fn set_surface_change(&mut self, width: u32, height: u32) -> Result<(), EngineError>;
    fn release(&mut self) -> Result<(), EngineError>;

    fn current_time(&self) -> u64;
    fn buffer_time(&self) -> u64;
    fn bandwidth_estimate(&self) -> u64;
    fn current_bitrate(&self) -> u32;
    fn duration(&self) -> u64;
}

/// Creates one engine per playback attempt.
///
/// The sink handed to `create` is bound to that attempt; the engine posts all
/// of its callbacks through it.
pub trait EngineFactory: Send + Sync {
    fn create(&self, sink: EngineEventSink) -> Result<Box<dyn PlayerEngine>, EngineError>;
}

/// Callback events emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    BufferingProgress(u8),
    Ready,
    Started,
    Error { code: i32, extra: i32 },
    ResolutionChanged { width: u32, height: u32 },
    PlayEnded,
    SeekEnded,
    Generic {
        code: i32,
        extra: i32,
        payload: Option<String>,
    },
}

/// Posts engine callbacks onto the session owner task.
///
/// Safe to call from any thread. Events are processed in the order they were
/// posted; events from a replaced attempt are dropped by the controller.
#[derive(Clone)]
pub struct EngineEventSink {
    attempt: u64,
    tx: mpsc::UnboundedSender<SessionMessage>,
}

impl EngineEventSink {
    pub(crate) fn new(attempt: u64, tx: mpsc::UnboundedSender<SessionMessage>) -> Self {
        Self { attempt, tx }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Post an event. Returns false if the session has shut down.
    pub fn post(&self, event: EngineEvent) -> bool {
        let delivered = self
            .tx
            .send(SessionMessage::Engine {
                attempt: self.attempt,
                event,
            })
            .is_ok();
        if !delivered {
            debug!("Engine event dropped, session closed (attempt {})", self.attempt);
        }
        delivered
    }

    pub fn on_buffering_progress(&self, percent: u8) -> bool {
        self.post(EngineEvent::BufferingProgress(percent))
    }

    pub fn on_ready(&self) -> bool {
        self.post(EngineEvent::Ready)
    }

    pub fn on_started(&self) -> bool {
        self.post(EngineEvent::Started)
    }

    pub fn on_error(&self, code: i32, extra: i32) -> bool {
        self.post(EngineEvent::Error { code, extra })
    }

    pub fn on_resolution_changed(&self, width: u32, height: u32) -> bool {
        self.post(EngineEvent::ResolutionChanged { width, height })
    }

    pub fn on_play_ended(&self) -> bool {
        self.post(EngineEvent::PlayEnded)
    }

    pub fn on_seek_end(&self) -> bool {
        self.post(EngineEvent::SeekEnded)
    }

    pub fn on_generic_event(&self, code: i32, extra: i32, payload: Option<String>) -> bool {
        self.post(EngineEvent::Generic {
            code,
            extra,
            payload,
        })
    }
}
