#![allow(dead_code)]

use playsession::playback::{
    MediaDescriptor, RenderTarget, SessionEvent, SessionRequest, SessionSnapshot, SurfaceKind,
};
use playsession::test_support::{MockEngineFactory, MockPlayerEngine};
use playsession::{
    Config, EngineEventSink, MemoryProgressStore, PlaybackService, ProgressStore, SessionHandle,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A running session wired to a mock engine factory
pub struct Fixture {
    pub handle: SessionHandle,
    pub factory: Arc<MockEngineFactory>,
    pub events: UnboundedReceiver<SessionEvent>,
}

impl Fixture {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self::with_config(Config::default(), store)
    }

    pub fn with_config(config: Config, store: Arc<dyn ProgressStore>) -> Self {
        tracing_init();
        let factory = Arc::new(MockEngineFactory::new());
        let handle = PlaybackService::start(
            config,
            factory.clone(),
            store,
            tokio::runtime::Handle::current(),
        );
        let events = handle.subscribe_events();

        Self {
            handle,
            factory,
            events,
        }
    }

    pub fn with_memory_store() -> (Self, Arc<MemoryProgressStore>) {
        let store = Arc::new(MemoryProgressStore::new());
        (Self::new(store.clone()), store)
    }

    pub async fn start_session(&self, ids: &[&str]) {
        let playlist = playlist(ids);
        let request = SessionRequest {
            descriptor: playlist[0].clone(),
            playlist,
        };
        self.handle
            .start_session(request)
            .await
            .expect("session should start");
    }

    /// Start a session, attach a surface and deliver Ready
    pub async fn start_playing(&self, ids: &[&str]) -> SessionSnapshot {
        self.start_session(ids).await;
        self.handle.surface_available(surface(1));
        self.sink().on_ready();
        let snapshot = self.barrier().await;
        assert_eq!(snapshot.phase, playsession::playback::Phase::Playing);
        snapshot
    }

    pub fn engine(&self) -> MockPlayerEngine {
        self.factory.latest_engine().expect("an engine was created")
    }

    pub fn sink(&self) -> EngineEventSink {
        self.factory.latest_sink().expect("an engine was created")
    }

    /// Snapshot request: everything posted before it has been handled
    pub async fn barrier(&self) -> SessionSnapshot {
        self.handle.snapshot().await.expect("session is running")
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn playlist(ids: &[&str]) -> Vec<MediaDescriptor> {
    ids.iter()
        .map(|id| MediaDescriptor::new(*id, format!("https://cdn.test/{}/index.m3u8", id)))
        .collect()
}

pub fn surface(handle: u64) -> RenderTarget {
    RenderTarget {
        kind: SurfaceKind::SurfaceView,
        handle,
        width: 1920,
        height: 1080,
    }
}

pub fn count_matching<F>(events: &[SessionEvent], predicate: F) -> usize
where
    F: Fn(&SessionEvent) -> bool,
{
    events.iter().filter(|e| predicate(e)).count()
}
