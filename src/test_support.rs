// Test support utilities for both unit and integration tests

use crate::engine::{EngineError, EngineEventSink, EngineFactory, PlayerEngine, ResumeMode};
use crate::playback::state::{BandwidthSwitchMode, MediaDescriptor, PlayMode};
use crate::playback::surface::RenderTarget;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One command as received by `MockPlayerEngine`
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Prepare {
        item_id: String,
        start_position_millis: u64,
    },
    Start,
    Pause,
    Resume(ResumeMode),
    Suspend,
    Stop,
    Seek(u64),
    SetBitrate {
        bitrate: u32,
        smooth: bool,
    },
    SetPlaybackSpeed(f32),
    SetMute(bool),
    SetVolume(f32),
    SetCycleMode(bool),
    SetPlayMode(PlayMode),
    SetBandwidthSwitchMode {
        mode: BandwidthSwitchMode,
        update_now: bool,
    },
    SetBufferingStatus {
        keep_downloading: bool,
        update_now: bool,
    },
    CloseLogo,
    AttachSurface(u64),
    SetSurfaceChange {
        width: u32,
        height: u32,
    },
    Release,
}

#[derive(Default)]
struct MockEngineState {
    commands: Vec<EngineCommand>,
    current_time: u64,
    buffer_time: u64,
    bandwidth: u64,
    bitrate: u32,
    duration: u64,
    failing: bool,
    settings_not_ready: bool,
}

/// Mock player engine for testing
///
/// Records every command it receives and reports whatever samples the test
/// sets. Clones share state, so a test can keep one clone while the session
/// owns the boxed engine.
#[derive(Clone, Default)]
pub struct MockPlayerEngine {
    state: Arc<Mutex<MockEngineState>>,
}

impl MockPlayerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockEngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn commands(&self) -> Vec<EngineCommand> {
        self.state().commands.clone()
    }

    pub fn count(&self, command: &EngineCommand) -> usize {
        self.state().commands.iter().filter(|c| *c == command).count()
    }

    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    pub fn set_current_time(&self, millis: u64) {
        self.state().current_time = millis;
    }

    pub fn set_buffer_time(&self, millis: u64) {
        self.state().buffer_time = millis;
    }

    pub fn set_duration(&self, millis: u64) {
        self.state().duration = millis;
    }

    pub fn set_bandwidth(&self, bps: u64, bitrate: u32) {
        let mut state = self.state();
        state.bandwidth = bps;
        state.bitrate = bitrate;
    }

    /// Make every subsequent command fail
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Make bitrate/speed/mute/volume commands fail with `NotReady`
    pub fn set_settings_not_ready(&self, not_ready: bool) {
        self.state().settings_not_ready = not_ready;
    }

    fn record_setting(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        if self.state().settings_not_ready {
            return Err(EngineError::NotReady);
        }
        self.record(command)
    }

    fn record(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.failing {
            return Err(EngineError::Rejected(format!("{:?}", command)));
        }
        state.commands.push(command);
        Ok(())
    }
}

impl PlayerEngine for MockPlayerEngine {
    fn prepare(
        &mut self,
        descriptor: &MediaDescriptor,
        start_position_millis: u64,
    ) -> Result<(), EngineError> {
        self.record(EngineCommand::Prepare {
            item_id: descriptor.item_id.clone(),
            start_position_millis,
        })
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.record(EngineCommand::Start)
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.record(EngineCommand::Pause)
    }

    fn resume(&mut self, mode: ResumeMode) -> Result<(), EngineError> {
        self.record(EngineCommand::Resume(mode))
    }

    fn suspend(&mut self) -> Result<(), EngineError> {
        self.record(EngineCommand::Suspend)
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.record(EngineCommand::Stop)
    }

    fn seek(&mut self, position_millis: u64) -> Result<(), EngineError> {
        self.record(EngineCommand::Seek(position_millis))
    }

    fn set_bitrate(&mut self, bitrate: u32, smooth: bool) -> Result<(), EngineError> {
        self.record_setting(EngineCommand::SetBitrate { bitrate, smooth })
    }

    fn set_playback_speed(&mut self, speed: f32) -> Result<(), EngineError> {
        self.record_setting(EngineCommand::SetPlaybackSpeed(speed))
    }

    fn set_mute(&mut self, muted: bool) -> Result<(), EngineError> {
        self.record_setting(EngineCommand::SetMute(muted))
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        self.record_setting(EngineCommand::SetVolume(volume))
    }

    fn set_cycle_mode(&mut self, enabled: bool) -> Result<(), EngineError> {
        self.record(EngineCommand::SetCycleMode(enabled))
    }

    fn set_play_mode(&mut self, mode: PlayMode) -> Result<(), EngineError> {
        self.record(EngineCommand::SetPlayMode(mode))
    }

    fn set_bandwidth_switch_mode(
        &mut self,
        mode: BandwidthSwitchMode,
        update_now: bool,
    ) -> Result<(), EngineError> {
        self.record(EngineCommand::SetBandwidthSwitchMode { mode, update_now })
    }

    fn set_buffering_status(
        &mut self,
        keep_downloading: bool,
        update_now: bool,
    ) -> Result<(), EngineError> {
        self.record(EngineCommand::SetBufferingStatus {
            keep_downloading,
            update_now,
        })
    }

    fn close_logo(&mut self) -> Result<(), EngineError> {
        self.record(EngineCommand::CloseLogo)
    }

    fn attach_surface(&mut self, target: &RenderTarget) -> Result<(), EngineError> {
        self.record(EngineCommand::AttachSurface(target.handle))
    }

    fn set_surface_change(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        self.record(EngineCommand::SetSurfaceChange { width, height })
    }

    fn release(&mut self) -> Result<(), EngineError> {
        self.record(EngineCommand::Release)
            .map_err(|e| EngineError::Release(e.to_string()))
    }

    fn current_time(&self) -> u64 {
        self.state().current_time
    }

    fn buffer_time(&self) -> u64 {
        self.state().buffer_time
    }

    fn bandwidth_estimate(&self) -> u64 {
        self.state().bandwidth
    }

    fn current_bitrate(&self) -> u32 {
        self.state().bitrate
    }

    fn duration(&self) -> u64 {
        self.state().duration
    }
}

/// Mock engine factory for testing
///
/// Keeps every engine it creates together with the event sink the session
/// handed over, so tests can inspect commands and inject callbacks.
#[derive(Default)]
pub struct MockEngineFactory {
    created: Mutex<Vec<(MockPlayerEngine, EngineEventSink)>>,
    fail_create: AtomicBool,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn created(&self) -> MutexGuard<'_, Vec<(MockPlayerEngine, EngineEventSink)>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make engine initialization fail from now on
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created().len()
    }

    pub fn engine(&self, index: usize) -> Option<MockPlayerEngine> {
        self.created().get(index).map(|(engine, _)| engine.clone())
    }

    pub fn sink(&self, index: usize) -> Option<EngineEventSink> {
        self.created().get(index).map(|(_, sink)| sink.clone())
    }

    pub fn latest_engine(&self) -> Option<MockPlayerEngine> {
        self.created().last().map(|(engine, _)| engine.clone())
    }

    pub fn latest_sink(&self) -> Option<EngineEventSink> {
        self.created().last().map(|(_, sink)| sink.clone())
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self, sink: EngineEventSink) -> Result<Box<dyn PlayerEngine>, EngineError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Init("mock engine unavailable".to_string()));
        }

        let engine = MockPlayerEngine::new();
        self.created().push((engine.clone(), sink));
        Ok(Box::new(engine))
    }
}
