// # Playback Controller
//
// The hub of a playback session. Surface events, user requests, engine
// callbacks and timer firings all arrive here, one at a time, on the session
// owner task. The controller updates `SessionState` / `SurfaceBinding`,
// issues engine commands and publishes presentation events.

use crate::config::Config;
use crate::engine::{
    EngineError, EngineEvent, EngineEventSink, EngineFactory, PlayerEngine, ResumeMode,
};
use crate::playback::events::{ProgressSample, SessionEvent, SessionEventHandle};
use crate::playback::scheduler::{
    ProgressScheduler, TimerFired, TimerKind, POLL_INTERVAL, SEEK_SETTLE_DELAY,
};
use crate::playback::service::{SessionCommand, SessionMessage};
use crate::playback::state::{
    BandwidthSwitchMode, BitrateSelection, DeferredPlay, MediaDescriptor, PendingSettings, Phase,
    PlayMode, SessionRequest, SessionSnapshot, SessionState, StreamRequestMode,
};
use crate::playback::surface::{SurfaceBinding, SurfaceEvent, SurfaceTransition};
use crate::store::ProgressStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Playback session is closed")]
    ServiceClosed,
}

/// Engine error code reported when a lifecycle command itself fails
const COMMAND_FAILURE_CODE: i32 = -1;

pub struct PlaybackController {
    config: Config,
    factory: Arc<dyn EngineFactory>,
    store: Arc<dyn ProgressStore>,
    message_tx: mpsc::UnboundedSender<SessionMessage>,
    events: SessionEventHandle,
    engine: Option<Box<dyn PlayerEngine>>,
    session: Option<SessionState>,
    surface: SurfaceBinding,
    scheduler: ProgressScheduler,
    playlist: Vec<MediaDescriptor>,
    next_attempt: u64,
    /// Host is not visible; only `host_foreground` restarts polling
    backgrounded: bool,
    torn_down: bool,
}

impl PlaybackController {
    pub(crate) fn new(
        config: Config,
        factory: Arc<dyn EngineFactory>,
        store: Arc<dyn ProgressStore>,
        message_tx: mpsc::UnboundedSender<SessionMessage>,
        events: SessionEventHandle,
    ) -> Self {
        Self {
            surface: SurfaceBinding::new(config.surface_kind),
            scheduler: ProgressScheduler::new(message_tx.clone()),
            config,
            factory,
            store,
            message_tx,
            events,
            engine: None,
            session: None,
            playlist: Vec::new(),
            next_attempt: 0,
            backgrounded: false,
            torn_down: false,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        self.session.as_ref().map(|s| s.phase())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let defaults = SessionState::new(
            0,
            MediaDescriptor::new(String::new(), String::new()),
            &self.config,
        );
        let state = self.session.as_ref().unwrap_or(&defaults);

        SessionSnapshot {
            attempt: state.attempt(),
            item_id: self.session.as_ref().map(|s| s.descriptor().item_id.clone()),
            phase: state.phase(),
            resume_position_millis: state.resume_position_millis(),
            bitrate_index: state.bitrate_index(),
            is_auto_bitrate: state.is_auto_bitrate(),
            playback_speed: state.playback_speed(),
            is_muted: state.is_muted(),
            volume: state.volume(),
            is_cycle_mode: state.is_cycle_mode(),
            is_http_source: state.is_http_source(),
            stream_request_mode: state.stream_request_mode(),
            bandwidth_mode: state.bandwidth_mode(),
            play_mode: state.play_mode(),
            ready_seen: state.ready_seen(),
            is_advancing: state.is_advancing(),
            is_scrubbing: state.is_scrubbing(),
            surface_attached: self.surface.is_attached(),
            polling: self.scheduler.is_polling(),
        }
    }

    /// Handle one user request
    pub(crate) async fn apply(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        if self.torn_down {
            return Err(SessionError::ServiceClosed);
        }

        let result = match command {
            SessionCommand::Start(request) => self.start_session(request).await,
            SessionCommand::Ready => self.ready().await,
            SessionCommand::TogglePlay => self.toggle_play().await,
            SessionCommand::Pause => self.pause().await,
            SessionCommand::Resume => self.resume(),
            SessionCommand::BeginScrub => self.begin_scrub(),
            SessionCommand::SeekTo(position) => self.seek_to(position),
            SessionCommand::SelectBitrate(selection) => self.select_bitrate(selection),
            SessionCommand::SetBitrateSwitchMode(smooth) => {
                self.adjustable_session()?.set_auto_bitrate(smooth);
                Ok(())
            }
            SessionCommand::SetSpeed(speed) => self.set_speed(speed),
            SessionCommand::SetMute(muted) => self.set_mute(muted),
            SessionCommand::ToggleMute => {
                let muted = !self.adjustable_session()?.is_muted();
                self.set_mute(muted)
            }
            SessionCommand::SetVolume(volume) => self.set_volume(volume),
            SessionCommand::SetCycleMode(enabled) => self.set_cycle_mode(enabled),
            SessionCommand::SetBandwidthMode(mode) => self.set_bandwidth_mode(mode),
            SessionCommand::SetStreamRequestMode(mode) => self.set_stream_request_mode(mode),
            SessionCommand::SetPlayMode(mode) => self.set_play_mode(mode),
            SessionCommand::CloseLogo => self.close_logo(),
            SessionCommand::SelectItem(index) => self.select_item(index).await,
            SessionCommand::HostForeground => {
                self.host_foreground();
                Ok(())
            }
            SessionCommand::HostBackground => {
                self.host_background().await;
                Ok(())
            }
            SessionCommand::Shutdown => {
                self.teardown().await;
                Ok(())
            }
        };

        if let Err(e) = &result {
            warn!("Request rejected: {}", e);
        }
        result
    }

    // ========== SESSION LIFECYCLE ==========

    async fn start_session(&mut self, request: SessionRequest) -> Result<(), SessionError> {
        if let Some(state) = &self.session {
            if state.phase().is_in_progress() {
                return Err(SessionError::Precondition(format!(
                    "session already running ({:?})",
                    state.phase()
                )));
            }
        }

        info!(
            "Starting session for '{}' ({} playlist items)",
            request.descriptor.item_id,
            request.playlist.len()
        );
        self.playlist = request.playlist;
        self.begin_attempt(request.descriptor)?;
        self.prepare_current().await
    }

    /// Prepare the current item. From Completed/Failed this is an external
    /// retry and starts a fresh attempt.
    async fn ready(&mut self) -> Result<(), SessionError> {
        let state = self
            .session
            .as_ref()
            .ok_or_else(|| SessionError::Precondition("no media item selected".to_string()))?;

        match state.phase() {
            Phase::Idle => {}
            Phase::Completed | Phase::Failed => {
                let descriptor = state.descriptor().clone();
                info!("Retrying '{}' with a fresh attempt", descriptor.item_id);
                self.begin_attempt(descriptor)?;
            }
            phase => {
                return Err(SessionError::Precondition(format!(
                    "ready() called while {:?}",
                    phase
                )));
            }
        }

        self.prepare_current().await
    }

    async fn select_item(&mut self, index: usize) -> Result<(), SessionError> {
        let descriptor = self.playlist.get(index).cloned().ok_or_else(|| {
            SessionError::InvalidArgument(format!(
                "item {} out of range ({} items)",
                index,
                self.playlist.len()
            ))
        })?;

        info!("Switching to playlist item {} ('{}')", index, descriptor.item_id);
        self.persist_resume_position("item switch").await;

        let item_id = descriptor.item_id.clone();
        self.begin_attempt(descriptor)?;
        self.emit(SessionEvent::ItemChanged { index, item_id });
        self.prepare_current().await
    }

    /// Tear down the previous attempt and build a new Idle one.
    ///
    /// Pending scheduled work is cancelled before any command reaches the new
    /// engine; the new engine's sink carries the new attempt id.
    fn begin_attempt(&mut self, descriptor: MediaDescriptor) -> Result<(), SessionError> {
        self.scheduler.cancel_all();
        self.release_engine();

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let mut state = SessionState::new(attempt, descriptor, &self.config);
        self.surface = self.surface.carry_over();

        let sink = EngineEventSink::new(attempt, self.message_tx.clone());
        match self.factory.create(sink) {
            Ok(engine) => {
                debug!("Created engine for attempt {}", attempt);
                self.engine = Some(engine);
                self.session = Some(state);
                self.emit(SessionEvent::PhaseChanged { phase: Phase::Idle });
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize player engine: {}", e);
                state.set_phase(Phase::Failed);
                self.session = Some(state);
                self.emit(SessionEvent::PhaseChanged {
                    phase: Phase::Failed,
                });
                self.emit(SessionEvent::Error {
                    code: COMMAND_FAILURE_CODE,
                    extra: 0,
                    message: format!("init play fail: {}", e),
                });
                self.emit(SessionEvent::CloseRequested);
                Err(SessionError::Engine(e))
            }
        }
    }

    /// Idle -> Preparing: hand the item and its bookmark to the engine
    async fn prepare_current(&mut self) -> Result<(), SessionError> {
        let Some(state) = self.session.as_mut() else {
            return Err(SessionError::Precondition("no media item selected".to_string()));
        };
        let descriptor = state.descriptor().clone();

        let start_position = match descriptor.resume_position_millis {
            Some(position) => position,
            None => match self.store.load(&descriptor.item_id).await {
                Ok(position) => position.unwrap_or(0),
                Err(e) => {
                    warn!("Failed to load resume position for {}: {}", descriptor.item_id, e);
                    0
                }
            },
        };
        state.record_resume_position(start_position);
        let stream_mode = state.stream_request_mode();

        let Some(engine) = self.engine.as_mut() else {
            return Err(SessionError::Precondition("no engine for this attempt".to_string()));
        };

        info!(
            "Preparing '{}' from {}ms",
            descriptor.item_id, start_position
        );
        if let Err(e) = engine.prepare(&descriptor, start_position) {
            self.fail_attempt(COMMAND_FAILURE_CODE, 0);
            return Err(e.into());
        }
        if stream_mode == StreamRequestMode::StopOnPause {
            if let Err(e) = engine.set_buffering_status(false, true) {
                warn!("Engine rejected buffering status: {}", e);
            }
        }
        if let Some(target) = self.surface.target() {
            if let Err(e) = engine.attach_surface(target) {
                warn!("Failed to attach surface during prepare: {}", e);
            }
        }

        self.set_phase(Phase::Preparing);
        self.emit(SessionEvent::BufferingUpdate { percent: 0 });
        Ok(())
    }

    /// Controller teardown: persist, cancel everything, release the engine
    pub(crate) async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        info!("Tearing down playback controller");
        self.persist_resume_position("teardown").await;
        self.scheduler.cancel_all();
        self.release_engine();
        self.torn_down = true;
    }

    /// Best-effort: release failures are logged and swallowed
    fn release_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.stop() {
                warn!("Engine stop failed during release: {}", e);
            }
            if let Err(e) = engine.release() {
                warn!("Engine release failed: {}", e);
            }
        }
    }

    // ========== PLAY / PAUSE ==========

    async fn toggle_play(&mut self) -> Result<(), SessionError> {
        match self.current_phase()? {
            Phase::Playing | Phase::Suspended => self.pause().await,
            Phase::Paused | Phase::Completed => self.resume(),
            phase => Err(SessionError::Precondition(format!(
                "cannot toggle playback while {:?}",
                phase
            ))),
        }
    }

    async fn pause(&mut self) -> Result<(), SessionError> {
        match self.current_phase()? {
            Phase::Playing => {
                self.scheduler.stop_polling();
                self.persist_resume_position("pause").await;
                self.engine_command(|engine| engine.pause())?;
                self.set_phase(Phase::Paused);
                self.set_advancing(false);
                Ok(())
            }
            Phase::Suspended => {
                // No surface, nothing to pause on the engine; keep the queued play
                self.set_phase(Phase::Paused);
                self.set_advancing(false);
                Ok(())
            }
            phase => Err(SessionError::Precondition(format!(
                "cannot pause while {:?}",
                phase
            ))),
        }
    }

    fn resume(&mut self) -> Result<(), SessionError> {
        match self.current_phase()? {
            Phase::Paused => {
                self.session_mut()?.defer(DeferredPlay::Resume);
                self.play_or_queue()
            }
            Phase::Completed => {
                info!("Replaying completed item");
                self.scheduler.cancel_grace();
                self.session_mut()?.defer(DeferredPlay::Start);
                self.play_or_queue()
            }
            phase => Err(SessionError::Precondition(format!(
                "cannot resume while {:?}",
                phase
            ))),
        }
    }

    /// Issue the queued play command if a render target is attached,
    /// otherwise park in Suspended until one appears.
    fn play_or_queue(&mut self) -> Result<(), SessionError> {
        if !self.surface.is_attached() {
            info!("No render target, queueing play until a surface is available");
            self.set_phase(Phase::Suspended);
            return Ok(());
        }

        let play = self.session_mut()?.take_deferred().unwrap_or(DeferredPlay::Resume);
        match play {
            DeferredPlay::Start => self.engine_command(|engine| engine.start())?,
            DeferredPlay::Resume => self.engine_command(|engine| engine.resume(ResumeMode::Keep))?,
        }

        self.set_phase(Phase::Playing);
        self.set_advancing(true);
        self.start_polling_after(POLL_INTERVAL);
        Ok(())
    }

    // ========== SEEKING ==========

    fn begin_scrub(&mut self) -> Result<(), SessionError> {
        self.session_mut()?.set_scrubbing(true);
        Ok(())
    }

    /// Seek, then keep polling paused for the settle delay
    fn seek_to(&mut self, position_millis: u64) -> Result<(), SessionError> {
        let state = self.session_mut()?;
        let phase = state.phase();

        if !state.ready_seen() || !matches!(phase, Phase::Playing | Phase::Paused | Phase::Suspended)
        {
            return Err(SessionError::Precondition(format!(
                "cannot seek while {:?}",
                phase
            )));
        }
        state.set_scrubbing(false);

        self.scheduler.stop_polling();
        self.engine_command(|engine| engine.seek(position_millis))?;
        debug!("Seek to {}ms issued", position_millis);

        if let Some(engine) = self.engine.as_ref() {
            let sample = ProgressSample {
                position_millis,
                buffered_millis: engine.buffer_time(),
                bandwidth_bps: engine.bandwidth_estimate(),
                bitrate: engine.current_bitrate(),
            };
            self.emit(SessionEvent::Progress(sample));
        }
        self.emit(SessionEvent::BufferingUpdate { percent: 0 });

        if phase == Phase::Playing {
            self.start_polling_after(SEEK_SETTLE_DELAY);
        }
        Ok(())
    }

    // ========== SETTINGS ==========

    fn select_bitrate(&mut self, selection: BitrateSelection) -> Result<(), SessionError> {
        let bitrate = selection.bitrate_index();
        let state = self.adjustable_session()?;
        state.set_bitrate_index(bitrate);
        let smooth = state.is_auto_bitrate();

        self.forward_setting(
            |engine| engine.set_bitrate(bitrate, smooth),
            |pending, reapply| pending.bitrate = reapply.then_some(bitrate),
        )
    }

    fn set_speed(&mut self, speed: f32) -> Result<(), SessionError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(SessionError::InvalidArgument(format!(
                "playback speed must be positive, got {}",
                speed
            )));
        }
        self.adjustable_session()?.set_playback_speed(speed);
        self.forward_setting(
            |engine| engine.set_playback_speed(speed),
            |pending, reapply| pending.speed = reapply.then_some(speed),
        )
    }

    fn set_mute(&mut self, muted: bool) -> Result<(), SessionError> {
        self.adjustable_session()?.set_muted(muted);
        self.forward_setting(
            |engine| engine.set_mute(muted),
            |pending, reapply| pending.mute = reapply.then_some(muted),
        )
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), SessionError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(SessionError::InvalidArgument(format!(
                "volume must be within 0.0..=1.0, got {}",
                volume
            )));
        }
        self.adjustable_session()?.set_volume(volume);
        self.forward_setting(
            |engine| engine.set_volume(volume),
            |pending, reapply| pending.volume = reapply.then_some(volume),
        )
    }

    fn set_cycle_mode(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.adjustable_session()?.set_cycle_mode(enabled);
        self.forward(|engine| engine.set_cycle_mode(enabled))
    }

    fn set_bandwidth_mode(&mut self, mode: BandwidthSwitchMode) -> Result<(), SessionError> {
        self.adjustable_session()?.set_bandwidth_mode(mode);
        self.forward(|engine| engine.set_bandwidth_switch_mode(mode, true))
    }

    /// Forwarded verbatim as the engine's buffering status
    fn set_stream_request_mode(&mut self, mode: StreamRequestMode) -> Result<(), SessionError> {
        self.adjustable_session()?.set_stream_request_mode(mode);
        let keep_downloading = mode == StreamRequestMode::KeepDownloading;
        self.forward(|engine| engine.set_buffering_status(keep_downloading, true))
    }

    fn set_play_mode(&mut self, mode: PlayMode) -> Result<(), SessionError> {
        self.adjustable_session()?.set_play_mode(mode);
        self.forward(|engine| engine.set_play_mode(mode))
    }

    fn close_logo(&mut self) -> Result<(), SessionError> {
        if self.adjustable_session()?.is_http_source() {
            return Err(SessionError::Precondition(
                "logo can only be closed for local sources".to_string(),
            ));
        }
        self.forward(|engine| engine.close_logo())
    }

    // ========== HOST LIFECYCLE ==========

    async fn host_background(&mut self) {
        debug!("Host moved to background");
        self.backgrounded = true;
        self.scheduler.stop_polling();
        self.persist_resume_position("background").await;
    }

    fn host_foreground(&mut self) {
        debug!("Host moved to foreground");
        self.backgrounded = false;
        if self.phase() == Some(Phase::Playing) && !self.scheduler.is_polling() {
            self.scheduler.start_polling();
        }
    }

    // ========== SURFACE EVENTS ==========

    pub(crate) async fn on_surface_event(&mut self, event: SurfaceEvent) {
        if self.torn_down {
            return;
        }
        match event {
            SurfaceEvent::Available(target) => {
                if let Some(SurfaceTransition::Attached) = self.surface.on_available(target) {
                    self.on_attached();
                }
            }
            SurfaceEvent::Destroyed => {
                if let Some(SurfaceTransition::Detached) = self.surface.on_destroyed() {
                    self.on_detached().await;
                }
            }
            SurfaceEvent::Resized { width, height } => {
                if self.surface.resize(width, height) {
                    if let Some(engine) = self.engine.as_mut() {
                        if let Err(e) = engine.set_surface_change(width, height) {
                            warn!("Engine rejected surface change: {}", e);
                        }
                    }
                }
            }
        }
    }

    fn on_attached(&mut self) {
        info!("Render target attached");
        if let (Some(engine), Some(target)) = (self.engine.as_mut(), self.surface.target()) {
            if let Err(e) = engine.attach_surface(target) {
                warn!("Failed to attach surface: {}", e);
            }
        }

        if self.phase() == Some(Phase::Suspended) {
            if let Err(e) = self.play_or_queue() {
                warn!("Failed to continue playback on new surface: {}", e);
            }
        }
    }

    async fn on_detached(&mut self) {
        info!("Render target detached");
        match self.phase() {
            Some(Phase::Playing) => {
                self.scheduler.stop_polling();
                self.persist_resume_position("surface destroyed").await;
                if let Some(state) = self.session.as_mut() {
                    state.defer(DeferredPlay::Resume);
                }
                self.set_phase(Phase::Suspended);
                self.set_advancing(false);
                self.suspend_engine();
            }
            Some(Phase::Paused) => {
                self.persist_resume_position("surface destroyed").await;
                self.suspend_engine();
            }
            _ => {}
        }
    }

    fn suspend_engine(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.suspend() {
                warn!("Engine suspend failed: {}", e);
            }
        }
    }

    // ========== ENGINE CALLBACKS ==========

    pub(crate) async fn on_engine_event(&mut self, attempt: u64, event: EngineEvent) {
        let current = self.session.as_ref().map(|s| s.attempt());
        if self.torn_down || current != Some(attempt) {
            debug!(
                "Dropping {:?} from stale attempt {} (current {:?})",
                event, attempt, current
            );
            return;
        }

        match event {
            EngineEvent::BufferingProgress(percent) => self.on_buffering_progress(percent),
            EngineEvent::Ready => self.on_ready(),
            EngineEvent::Started => {
                debug!("Engine started playing");
                if self.phase() == Some(Phase::Playing) {
                    self.set_advancing(true);
                }
            }
            EngineEvent::Error { code, extra } => self.on_error(code, extra),
            EngineEvent::ResolutionChanged { width, height } => {
                debug!("Resolution changed to {}x{}", width, height);
                self.emit(SessionEvent::ResolutionChanged { width, height });
            }
            EngineEvent::PlayEnded => self.on_play_ended().await,
            EngineEvent::SeekEnded => {
                debug!("Engine finished seeking");
            }
            EngineEvent::Generic { code, extra, .. } => {
                // Coarse signal: any generic event means "not actively advancing"
                debug!("Engine event code={} extra={}", code, extra);
                self.set_advancing(false);
            }
        }
    }

    fn on_buffering_progress(&mut self, percent: u8) {
        if self.phase() == Some(Phase::Preparing) {
            self.set_phase(Phase::Buffering);
        }
        if percent < 100 {
            self.emit(SessionEvent::BufferingUpdate { percent });
        } else {
            self.emit(SessionEvent::BufferingFinished);
        }
    }

    /// Preparing/Buffering -> Playing (or Suspended when no surface exists yet)
    fn on_ready(&mut self) {
        let Some(state) = self.session.as_mut() else {
            return;
        };
        if !matches!(state.phase(), Phase::Preparing | Phase::Buffering) {
            debug!("Ignoring Ready while {:?}", state.phase());
            return;
        }

        info!("Engine ready for '{}'", state.descriptor().item_id);
        state.mark_ready();
        let pending = state.take_pending();
        let smooth = state.is_auto_bitrate();
        let item_id = state.descriptor().item_id.clone();
        let name = state.descriptor().name.clone();
        state.defer(DeferredPlay::Start);
        if !pending.is_empty() {
            debug!("Applying settings buffered before ready: {:?}", pending);
        }

        if let Some(engine) = self.engine.as_mut() {
            if let Some(bitrate) = pending.bitrate {
                if let Err(e) = engine.set_bitrate(bitrate, smooth) {
                    warn!("Failed to apply buffered bitrate: {}", e);
                }
            }
            if let Some(speed) = pending.speed {
                if let Err(e) = engine.set_playback_speed(speed) {
                    warn!("Failed to apply buffered speed: {}", e);
                }
            }
            if let Some(muted) = pending.mute {
                if let Err(e) = engine.set_mute(muted) {
                    warn!("Failed to apply buffered mute: {}", e);
                }
            }
            if let Some(volume) = pending.volume {
                if let Err(e) = engine.set_volume(volume) {
                    warn!("Failed to apply buffered volume: {}", e);
                }
            }

            let duration_millis = engine.duration();
            self.emit(SessionEvent::Prepared {
                item_id,
                name,
                duration_millis,
            });
        }

        if let Err(e) = self.play_or_queue() {
            warn!("Failed to start playback: {}", e);
        }
    }

    fn on_error(&mut self, code: i32, extra: i32) {
        match self.phase() {
            Some(Phase::Idle) | Some(Phase::Completed) | Some(Phase::Failed) | None => {
                warn!(
                    "Ignoring engine error {} (extra {}) outside an active attempt",
                    code, extra
                );
            }
            Some(_) => self.fail_attempt(code, extra),
        }
    }

    /// Any active phase -> Failed, with a delayed close request
    fn fail_attempt(&mut self, code: i32, extra: i32) {
        error!("Playback failed: what={} extra={}", code, extra);
        self.scheduler.stop_polling();
        self.set_phase(Phase::Failed);
        self.set_advancing(false);
        self.emit(SessionEvent::BufferingFinished);
        self.emit(SessionEvent::Error {
            code,
            extra,
            message: format!("error:{} extra:{}", code, extra),
        });
        self.scheduler.schedule_error_close();
    }

    async fn on_play_ended(&mut self) {
        if self.phase() != Some(Phase::Playing) {
            debug!("Ignoring end of media while {:?}", self.phase());
            return;
        }

        self.scheduler.stop_polling();
        if let Some(state) = self.session.as_mut() {
            info!("Playback of '{}' completed", state.descriptor().item_id);
            state.clear_resume_position();
            let item_id = state.descriptor().item_id.clone();
            if let Err(e) = self.store.clear(&item_id).await {
                warn!("Failed to clear resume position for {}: {}", item_id, e);
            }
        }
        self.set_phase(Phase::Completed);
        self.set_advancing(false);
        self.scheduler.schedule_completion();
    }

    // ========== TIMERS ==========

    pub(crate) async fn on_timer(&mut self, fired: TimerFired) {
        if self.torn_down {
            return;
        }
        match self.scheduler.accept(&fired) {
            Some(TimerKind::ProgressTick) => self.on_progress_tick(),
            Some(TimerKind::CompletionGrace) => {
                debug!("Completion grace elapsed");
                self.emit(SessionEvent::Completed);
            }
            Some(TimerKind::ErrorGrace) => {
                info!("Error grace elapsed, requesting close");
                self.emit(SessionEvent::CloseRequested);
            }
            None => {}
        }
    }

    fn on_progress_tick(&mut self) {
        let Some(state) = self.session.as_ref() else {
            return;
        };
        if state.phase() != Phase::Playing {
            return;
        }

        if !state.is_scrubbing() {
            if let Some(engine) = self.engine.as_ref() {
                let sample = ProgressSample {
                    position_millis: engine.current_time(),
                    buffered_millis: engine.buffer_time(),
                    bandwidth_bps: engine.bandwidth_estimate(),
                    bitrate: engine.current_bitrate(),
                };
                self.emit(SessionEvent::Progress(sample));
            }
        }
        self.start_polling_after(POLL_INTERVAL);
    }

    // ========== HELPERS ==========

    /// Save the engine's current position for the current item.
    ///
    /// Skipped once Completed (position already cleared) and before the
    /// engine's first Ready (there is no meaningful position yet).
    async fn persist_resume_position(&mut self, trigger: &str) {
        let (item_id, position) = {
            let (Some(state), Some(engine)) = (self.session.as_mut(), self.engine.as_ref()) else {
                return;
            };
            if !state.ready_seen() || state.phase() == Phase::Completed {
                return;
            }

            let position = engine.current_time();
            state.record_resume_position(position);
            (state.descriptor().item_id.clone(), position)
        };

        match self.store.save(&item_id, position).await {
            Ok(()) => info!("Saved resume position {}ms for {} ({})", position, item_id, trigger),
            Err(e) => warn!("Failed to save resume position for {}: {}", item_id, e),
        }
    }

    fn current_phase(&self) -> Result<Phase, SessionError> {
        self.phase()
            .ok_or_else(|| SessionError::Precondition("no media item selected".to_string()))
    }

    fn session_mut(&mut self) -> Result<&mut SessionState, SessionError> {
        self.session
            .as_mut()
            .ok_or_else(|| SessionError::Precondition("no media item selected".to_string()))
    }

    /// Session that still accepts setting changes (any non-terminal phase)
    fn adjustable_session(&mut self) -> Result<&mut SessionState, SessionError> {
        let state = self.session_mut()?;
        if state.phase().is_terminal() {
            return Err(SessionError::Precondition(format!(
                "settings cannot change while {:?}",
                state.phase()
            )));
        }
        Ok(state)
    }

    /// Lifecycle command: a failure fails the attempt
    fn engine_command<F>(&mut self, command: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut dyn PlayerEngine) -> Result<(), EngineError>,
    {
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or_else(|| SessionError::Precondition("no engine for this attempt".to_string()))?;

        if let Err(e) = command(engine) {
            self.fail_attempt(COMMAND_FAILURE_CODE, 0);
            return Err(e.into());
        }
        Ok(())
    }

    /// Settings command: a failure is reported but the recorded value stays
    fn forward<F>(&mut self, command: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut dyn PlayerEngine) -> Result<(), EngineError>,
    {
        match self.engine.as_deref_mut() {
            Some(engine) => command(engine).map_err(SessionError::from),
            None => Ok(()),
        }
    }

    /// Bitrate/speed/mute/volume: always forwarded. Before the first Ready a
    /// rejected value is kept for re-application on Ready, and an accepted
    /// one drops any earlier rejected value. After Ready a rejection is
    /// reported to the caller.
    fn forward_setting<F, B>(&mut self, command: F, buffer: B) -> Result<(), SessionError>
    where
        F: FnOnce(&mut dyn PlayerEngine) -> Result<(), EngineError>,
        B: FnOnce(&mut PendingSettings, bool),
    {
        let ready_seen = self.session.as_ref().is_some_and(|s| s.ready_seen());
        let result = self.forward(command);
        if ready_seen {
            return result;
        }

        if let Err(e) = &result {
            debug!("Engine not accepting settings yet ({}), buffering until ready", e);
        }
        if let Some(state) = self.session.as_mut() {
            buffer(state.pending_mut(), result.is_err());
        }
        Ok(())
    }

    /// Restart polling unless the host is in the background
    fn start_polling_after(&mut self, delay: std::time::Duration) {
        if self.backgrounded {
            debug!("Host in background, polling stays off");
            return;
        }
        self.scheduler.start_polling_after(delay);
    }

    fn set_phase(&mut self, phase: Phase) {
        if let Some(state) = self.session.as_mut() {
            let previous = state.set_phase(phase);
            if previous != phase {
                info!("Phase {:?} -> {:?}", previous, phase);
                self.emit(SessionEvent::PhaseChanged { phase });
            }
        }
    }

    fn set_advancing(&mut self, advancing: bool) {
        if let Some(state) = self.session.as_mut() {
            if state.is_advancing() != advancing {
                state.set_advancing(advancing);
                self.emit(SessionEvent::PlayStateChanged { playing: advancing });
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.events.publish(event);
    }
}
