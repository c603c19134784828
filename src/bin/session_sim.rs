use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use playsession::playback::{MediaDescriptor, RenderTarget, SessionEvent, SessionRequest};
use playsession::test_support::MockEngineFactory;
use playsession::{Config, FileProgressStore, MemoryProgressStore, PlaybackService, ProgressStore};

/// Drives one scripted session against the mock engine and prints every
/// presentation event. Useful for eyeballing controller behaviour end to end.
#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level for detailed output
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let args: Vec<String> = env::args().collect();
    let mut item_id = "demo-item".to_string();
    let mut url = "https://example.invalid/demo.m3u8".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--item" if i + 1 < args.len() => {
                item_id = args[i + 1].clone();
                i += 2;
            }
            "--url" if i + 1 < args.len() => {
                url = args[i + 1].clone();
                i += 2;
            }
            "--help" | "-h" => {
                print_usage(&args[0]);
                return;
            }
            other => {
                error!("Unknown or incomplete argument: {}", other);
                print_usage(&args[0]);
                std::process::exit(1);
            }
        }
    }

    let config = Config::load();
    let store: Arc<dyn ProgressStore> = match config.get_progress_store_path() {
        Some(path) => match FileProgressStore::open(path).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to open progress store, falling back to memory: {}", e);
                Arc::new(MemoryProgressStore::new())
            }
        },
        None => Arc::new(MemoryProgressStore::new()),
    };

    let factory = Arc::new(MockEngineFactory::new());
    let surface_kind = config.surface_kind;
    let handle = PlaybackService::start(
        config,
        factory.clone(),
        store,
        tokio::runtime::Handle::current(),
    );

    let mut events = handle.subscribe_events();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let request = SessionRequest {
        descriptor: MediaDescriptor::new(item_id.clone(), url),
        playlist: Vec::new(),
    };
    if let Err(e) = handle.start_session(request).await {
        error!("Failed to start session: {}", e);
        std::process::exit(1);
    }

    let (Some(engine), Some(sink)) = (factory.latest_engine(), factory.latest_sink()) else {
        error!("Session did not create an engine");
        std::process::exit(1);
    };
    engine.set_duration(10_000);

    handle.surface_available(RenderTarget {
        kind: surface_kind,
        handle: 1,
        width: 1280,
        height: 720,
    });
    sink.on_buffering_progress(40);
    sink.on_buffering_progress(100);
    sink.on_ready();

    for position in [500u64, 1000, 1500, 2000] {
        engine.set_current_time(position);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    if let Err(e) = handle.pause().await {
        error!("Pause failed: {}", e);
    }
    handle.surface_destroyed();
    handle.surface_available(RenderTarget {
        kind: surface_kind,
        handle: 2,
        width: 1280,
        height: 720,
    });
    if let Err(e) = handle.resume().await {
        error!("Resume failed: {}", e);
    }

    engine.set_current_time(10_000);
    sink.on_play_ended();
    tokio::time::sleep(Duration::from_millis(1200)).await;

    match handle.snapshot().await {
        Ok(snapshot) => match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize snapshot: {}", e),
        },
        Err(e) => error!("Failed to read snapshot: {}", e),
    }

    if let Err(e) = handle.shutdown().await {
        error!("Shutdown failed: {}", e);
    }
    info!("Engine saw {} commands", engine.commands().len());
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Progress(sample) => println!(
            "progress {}ms (buffered {}ms)",
            sample.position_millis, sample.buffered_millis
        ),
        other => println!("{:?}", other),
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [--item <id>] [--url <url>]", program);
    eprintln!();
    eprintln!("Runs a scripted playback session against a mock engine.");
    eprintln!("Resume positions are stored at PLAYSESSION_PROGRESS_PATH");
    eprintln!("(default ~/.playsession/progress.json).");
}
