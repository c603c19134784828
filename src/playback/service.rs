use crate::config::Config;
use crate::engine::{EngineEvent, EngineFactory};
use crate::playback::controller::{PlaybackController, SessionError};
use crate::playback::events::{SessionEvent, SessionEventHandle};
use crate::playback::scheduler::TimerFired;
use crate::playback::state::{
    BandwidthSwitchMode, BitrateSelection, PlayMode, SessionRequest, SessionSnapshot,
    StreamRequestMode,
};
use crate::playback::surface::{RenderTarget, SurfaceEvent};
use crate::store::ProgressStore;
use std::sync::Arc;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tracing::info;

/// Requests a caller can make of a playback session
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Start(SessionRequest),
    Ready,
    TogglePlay,
    Pause,
    Resume,
    BeginScrub,
    SeekTo(u64),
    SelectBitrate(BitrateSelection),
    SetBitrateSwitchMode(bool),
    SetSpeed(f32),
    SetMute(bool),
    ToggleMute,
    SetVolume(f32),
    SetCycleMode(bool),
    SetBandwidthMode(BandwidthSwitchMode),
    SetStreamRequestMode(StreamRequestMode),
    SetPlayMode(PlayMode),
    CloseLogo,
    SelectItem(usize),
    HostForeground,
    HostBackground,
    Shutdown,
}

/// Everything the session owner task reacts to, in arrival order
pub(crate) enum SessionMessage {
    Request {
        command: SessionCommand,
        response_tx: oneshot::Sender<Result<(), SessionError>>,
    },
    Snapshot {
        response_tx: oneshot::Sender<SessionSnapshot>,
    },
    Surface(SurfaceEvent),
    Engine {
        attempt: u64,
        event: EngineEvent,
    },
    Timer(TimerFired),
}

/// Handle to a playback session for sending requests and surface events
#[derive(Clone)]
pub struct SessionHandle {
    message_tx: tokio_mpsc::UnboundedSender<SessionMessage>,
    events: SessionEventHandle,
}

impl SessionHandle {
    async fn request(&self, command: SessionCommand) -> Result<(), SessionError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.message_tx
            .send(SessionMessage::Request {
                command,
                response_tx,
            })
            .map_err(|_| SessionError::ServiceClosed)?;
        response_rx.await.map_err(|_| SessionError::ServiceClosed)?
    }

    pub async fn start_session(&self, request: SessionRequest) -> Result<(), SessionError> {
        self.request(SessionCommand::Start(request)).await
    }

    pub async fn ready(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Ready).await
    }

    pub async fn toggle_play(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::TogglePlay).await
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Resume).await
    }

    /// The user started dragging the progress bar; progress updates are held back
    pub async fn begin_scrub(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::BeginScrub).await
    }

    pub async fn seek_to(&self, position_millis: u64) -> Result<(), SessionError> {
        self.request(SessionCommand::SeekTo(position_millis)).await
    }

    pub async fn select_bitrate(&self, selection: BitrateSelection) -> Result<(), SessionError> {
        self.request(SessionCommand::SelectBitrate(selection)).await
    }

    pub async fn set_bitrate_switch_mode(&self, smooth: bool) -> Result<(), SessionError> {
        self.request(SessionCommand::SetBitrateSwitchMode(smooth))
            .await
    }

    pub async fn set_speed(&self, speed: f32) -> Result<(), SessionError> {
        self.request(SessionCommand::SetSpeed(speed)).await
    }

    pub async fn set_mute(&self, muted: bool) -> Result<(), SessionError> {
        self.request(SessionCommand::SetMute(muted)).await
    }

    pub async fn toggle_mute(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::ToggleMute).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<(), SessionError> {
        self.request(SessionCommand::SetVolume(volume)).await
    }

    pub async fn set_cycle_mode(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(SessionCommand::SetCycleMode(enabled)).await
    }

    pub async fn set_bandwidth_mode(&self, mode: BandwidthSwitchMode) -> Result<(), SessionError> {
        self.request(SessionCommand::SetBandwidthMode(mode)).await
    }

    pub async fn set_stream_request_mode(
        &self,
        mode: StreamRequestMode,
    ) -> Result<(), SessionError> {
        self.request(SessionCommand::SetStreamRequestMode(mode))
            .await
    }

    pub async fn set_play_mode(&self, mode: PlayMode) -> Result<(), SessionError> {
        self.request(SessionCommand::SetPlayMode(mode)).await
    }

    pub async fn close_logo(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::CloseLogo).await
    }

    pub async fn select_item(&self, index: usize) -> Result<(), SessionError> {
        self.request(SessionCommand::SelectItem(index)).await
    }

    pub async fn host_foreground(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::HostForeground).await
    }

    pub async fn host_background(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::HostBackground).await
    }

    /// Persist, release the engine and stop the owner task
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Shutdown).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.message_tx
            .send(SessionMessage::Snapshot { response_tx })
            .map_err(|_| SessionError::ServiceClosed)?;
        response_rx.await.map_err(|_| SessionError::ServiceClosed)
    }

    pub fn surface_available(&self, target: RenderTarget) {
        let _ = self
            .message_tx
            .send(SessionMessage::Surface(SurfaceEvent::Available(target)));
    }

    pub fn surface_resized(&self, width: u32, height: u32) {
        let _ = self
            .message_tx
            .send(SessionMessage::Surface(SurfaceEvent::Resized { width, height }));
    }

    pub fn surface_destroyed(&self) {
        let _ = self
            .message_tx
            .send(SessionMessage::Surface(SurfaceEvent::Destroyed));
    }

    pub fn subscribe_events(&self) -> tokio_mpsc::UnboundedReceiver<SessionEvent> {
        self.events.subscribe_all()
    }
}

/// Playback service owning one controller on a single task
pub struct PlaybackService {
    message_rx: tokio_mpsc::UnboundedReceiver<SessionMessage>,
    controller: PlaybackController,
}

impl PlaybackService {
    pub fn start(
        config: Config,
        factory: Arc<dyn EngineFactory>,
        store: Arc<dyn ProgressStore>,
        runtime_handle: tokio::runtime::Handle,
    ) -> SessionHandle {
        let (message_tx, message_rx) = tokio_mpsc::unbounded_channel();
        let events = SessionEventHandle::new();

        let handle = SessionHandle {
            message_tx: message_tx.clone(),
            events: events.clone(),
        };

        let controller = PlaybackController::new(config, factory, store, message_tx, events);
        let mut service = PlaybackService {
            message_rx,
            controller,
        };

        runtime_handle.spawn(async move {
            service.run().await;
        });

        handle
    }

    async fn run(&mut self) {
        info!("PlaybackService started");

        while let Some(message) = self.message_rx.recv().await {
            match message {
                SessionMessage::Request {
                    command,
                    response_tx,
                } => {
                    let shutdown = matches!(command, SessionCommand::Shutdown);
                    let result = self.controller.apply(command).await;
                    let _ = response_tx.send(result);
                    if shutdown {
                        break;
                    }
                }
                SessionMessage::Snapshot { response_tx } => {
                    let _ = response_tx.send(self.controller.snapshot());
                }
                SessionMessage::Surface(event) => {
                    self.controller.on_surface_event(event).await;
                }
                SessionMessage::Engine { attempt, event } => {
                    self.controller.on_engine_event(attempt, event).await;
                }
                SessionMessage::Timer(fired) => {
                    self.controller.on_timer(fired).await;
                }
            }
        }

        info!("PlaybackService stopped");
    }
}
