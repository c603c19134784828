//! Session state for one playback attempt.

use crate::config::Config;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a playback attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Preparing,
    Buffering,
    Playing,
    Paused,
    /// Render target lost while the session logically continues
    Suspended,
    Completed,
    Failed,
}

impl Phase {
    /// Completed and Failed end an attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Phases in which `ready()` must not be called again
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Phase::Preparing | Phase::Buffering | Phase::Playing | Phase::Paused | Phase::Suspended
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamRequestMode {
    KeepDownloading,
    StopOnPause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandwidthSwitchMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayMode {
    Normal,
    AudioOnly,
}

/// Bitrate chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitrateSelection {
    Automatic,
    Designated(u32),
}

impl BitrateSelection {
    /// Engine-facing value, 0 meaning automatic
    pub fn bitrate_index(&self) -> u32 {
        match self {
            BitrateSelection::Automatic => 0,
            BitrateSelection::Designated(bitrate) => *bitrate,
        }
    }
}

/// A playable item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub item_id: String,
    pub name: String,
    pub urls: Vec<String>,
    /// Saved position to start from; falls back to the progress store when None
    pub resume_position_millis: Option<u64>,
}

impl MediaDescriptor {
    pub fn new(item_id: impl Into<String>, url: impl Into<String>) -> Self {
        let item_id = item_id.into();
        Self {
            name: item_id.clone(),
            item_id,
            urls: vec![url.into()],
            resume_position_millis: None,
        }
    }

    pub fn is_http(&self) -> bool {
        self.urls.first().is_some_and(|url| {
            let url = url.to_lowercase();
            url.starts_with("http://") || url.starts_with("https://")
        })
    }
}

/// Session start request: the item to play plus its siblings
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub descriptor: MediaDescriptor,
    pub playlist: Vec<MediaDescriptor>,
}

/// Play command held back until a render target exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeferredPlay {
    /// Engine became ready without a surface; `start` was never issued
    Start,
    /// Engine was suspended; resume with KEEP
    Resume,
}

/// Settings requested before the engine first signalled Ready
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PendingSettings {
    pub bitrate: Option<u32>,
    pub speed: Option<f32>,
    pub mute: Option<bool>,
    pub volume: Option<f32>,
}

impl PendingSettings {
    pub fn is_empty(&self) -> bool {
        *self == PendingSettings::default()
    }
}

/// Authoritative state of one playback attempt.
///
/// Owned by the controller and mutated only on the session owner task.
/// Replaced wholesale when a new item is selected.
#[derive(Debug, Clone)]
pub struct SessionState {
    attempt: u64,
    descriptor: MediaDescriptor,
    phase: Phase,
    resume_position_millis: u64,
    bitrate_index: u32,
    is_auto_bitrate: bool,
    playback_speed: f32,
    is_muted: bool,
    volume: f32,
    is_cycle_mode: bool,
    stream_request_mode: StreamRequestMode,
    bandwidth_mode: BandwidthSwitchMode,
    play_mode: PlayMode,
    ready_seen: bool,
    advancing: bool,
    scrubbing: bool,
    deferred: Option<DeferredPlay>,
    pending: PendingSettings,
}

impl SessionState {
    pub fn new(attempt: u64, descriptor: MediaDescriptor, config: &Config) -> Self {
        Self {
            attempt,
            resume_position_millis: descriptor.resume_position_millis.unwrap_or(0),
            descriptor,
            phase: Phase::Idle,
            bitrate_index: 0,
            is_auto_bitrate: config.smooth_bitrate_switch,
            playback_speed: 1.0,
            is_muted: false,
            volume: 1.0,
            is_cycle_mode: false,
            stream_request_mode: config.stream_request_mode,
            bandwidth_mode: BandwidthSwitchMode::Auto,
            play_mode: PlayMode::Normal,
            ready_seen: false,
            advancing: false,
            scrubbing: false,
            deferred: None,
            pending: PendingSettings::default(),
        }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn descriptor(&self) -> &MediaDescriptor {
        &self.descriptor
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the previous phase
    pub(crate) fn set_phase(&mut self, phase: Phase) -> Phase {
        std::mem::replace(&mut self.phase, phase)
    }

    pub fn resume_position_millis(&self) -> u64 {
        self.resume_position_millis
    }

    /// Only called from explicit save triggers and the initial restore
    pub(crate) fn record_resume_position(&mut self, millis: u64) {
        self.resume_position_millis = millis;
    }

    pub(crate) fn clear_resume_position(&mut self) {
        self.resume_position_millis = 0;
    }

    pub fn bitrate_index(&self) -> u32 {
        self.bitrate_index
    }

    pub(crate) fn set_bitrate_index(&mut self, bitrate: u32) {
        self.bitrate_index = bitrate;
    }

    pub fn is_auto_bitrate(&self) -> bool {
        self.is_auto_bitrate
    }

    pub(crate) fn set_auto_bitrate(&mut self, smooth: bool) {
        self.is_auto_bitrate = smooth;
    }

    pub fn playback_speed(&self) -> f32 {
        self.playback_speed
    }

    pub(crate) fn set_playback_speed(&mut self, speed: f32) {
        self.playback_speed = speed;
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.is_muted = muted;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub fn is_cycle_mode(&self) -> bool {
        self.is_cycle_mode
    }

    pub(crate) fn set_cycle_mode(&mut self, enabled: bool) {
        self.is_cycle_mode = enabled;
    }

    pub fn is_http_source(&self) -> bool {
        self.descriptor.is_http()
    }

    pub fn stream_request_mode(&self) -> StreamRequestMode {
        self.stream_request_mode
    }

    pub(crate) fn set_stream_request_mode(&mut self, mode: StreamRequestMode) {
        self.stream_request_mode = mode;
    }

    pub fn bandwidth_mode(&self) -> BandwidthSwitchMode {
        self.bandwidth_mode
    }

    pub(crate) fn set_bandwidth_mode(&mut self, mode: BandwidthSwitchMode) {
        self.bandwidth_mode = mode;
    }

    pub fn play_mode(&self) -> PlayMode {
        self.play_mode
    }

    pub(crate) fn set_play_mode(&mut self, mode: PlayMode) {
        self.play_mode = mode;
    }

    /// Whether the engine has signalled Ready during this attempt
    pub fn ready_seen(&self) -> bool {
        self.ready_seen
    }

    pub(crate) fn mark_ready(&mut self) {
        self.ready_seen = true;
    }

    /// Coarse "playback is advancing" flag; cleared by any generic engine event
    pub fn is_advancing(&self) -> bool {
        self.advancing
    }

    pub(crate) fn set_advancing(&mut self, advancing: bool) {
        self.advancing = advancing;
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }

    pub(crate) fn set_scrubbing(&mut self, scrubbing: bool) {
        self.scrubbing = scrubbing;
    }

    /// Keeps an already-queued Start; a suspended engine never started must start, not resume
    pub(crate) fn defer(&mut self, play: DeferredPlay) {
        if self.deferred != Some(DeferredPlay::Start) {
            self.deferred = Some(play);
        }
    }

    pub(crate) fn take_deferred(&mut self) -> Option<DeferredPlay> {
        self.deferred.take()
    }

    pub(crate) fn pending_mut(&mut self) -> &mut PendingSettings {
        &mut self.pending
    }

    /// Drain settings buffered before the first Ready
    pub(crate) fn take_pending(&mut self) -> PendingSettings {
        std::mem::take(&mut self.pending)
    }
}

/// Read-only view of the session, as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub attempt: u64,
    pub item_id: Option<String>,
    pub phase: Phase,
    pub resume_position_millis: u64,
    pub bitrate_index: u32,
    pub is_auto_bitrate: bool,
    pub playback_speed: f32,
    pub is_muted: bool,
    pub volume: f32,
    pub is_cycle_mode: bool,
    pub is_http_source: bool,
    pub stream_request_mode: StreamRequestMode,
    pub bandwidth_mode: BandwidthSwitchMode,
    pub play_mode: PlayMode,
    pub ready_seen: bool,
    pub is_advancing: bool,
    pub is_scrubbing: bool,
    pub surface_attached: bool,
    pub polling: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(1, MediaDescriptor::new("item-1", "https://cdn/v.m3u8"), &Config::default())
    }

    #[test]
    fn new_state_starts_idle_with_defaults() {
        let state = state();

        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.playback_speed(), 1.0);
        assert_eq!(state.bitrate_index(), 0);
        assert!(state.is_auto_bitrate());
        assert!(!state.ready_seen());
        assert!(state.is_http_source());
    }

    #[test]
    fn resume_position_comes_from_descriptor() {
        let mut descriptor = MediaDescriptor::new("item-1", "/sdcard/v.mp4");
        descriptor.resume_position_millis = Some(42_000);
        let state = SessionState::new(3, descriptor, &Config::default());

        assert_eq!(state.resume_position_millis(), 42_000);
        assert!(!state.is_http_source());
    }

    #[test]
    fn pending_settings_drain_once() {
        let mut state = state();
        state.pending_mut().speed = Some(1.5);
        state.pending_mut().mute = Some(true);

        let first = state.take_pending();
        assert_eq!(first.speed, Some(1.5));
        assert_eq!(first.mute, Some(true));
        assert!(state.take_pending().is_empty());
    }

    #[test]
    fn queued_start_is_not_downgraded_to_resume() {
        let mut state = state();
        state.defer(DeferredPlay::Start);
        state.defer(DeferredPlay::Resume);

        assert_eq!(state.take_deferred(), Some(DeferredPlay::Start));
        assert_eq!(state.take_deferred(), None);
    }

    #[test]
    fn automatic_bitrate_is_index_zero() {
        assert_eq!(BitrateSelection::Automatic.bitrate_index(), 0);
        assert_eq!(BitrateSelection::Designated(2_500_000).bitrate_index(), 2_500_000);
    }

    #[test]
    fn phase_classification() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Suspended.is_terminal());
        assert!(Phase::Buffering.is_in_progress());
        assert!(!Phase::Idle.is_in_progress());
    }
}
