mod support;

use playsession::engine::ResumeMode;
use playsession::playback::{Phase, SessionEvent};
use playsession::test_support::EngineCommand;
use playsession::SessionError;
use std::time::Duration;
use support::{count_matching, surface, Fixture};

async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[tokio::test(start_paused = true)]
async fn ready_starts_playback_and_polls() {
    let (mut fx, _store) = Fixture::with_memory_store();
    let snapshot = fx.start_playing(&["movie"]).await;

    assert!(snapshot.polling);
    assert!(snapshot.ready_seen);
    assert_eq!(fx.engine().count(&EngineCommand::Start), 1);

    fx.engine().set_current_time(500);
    advance(510).await;
    fx.barrier().await;

    let events = fx.drain_events();
    assert!(events.contains(&SessionEvent::PhaseChanged {
        phase: Phase::Playing
    }));
    assert_eq!(
        count_matching(&events, |e| matches!(
            e,
            SessionEvent::Progress(sample) if sample.position_millis == 500
        )),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn surface_loss_suspends_and_reattach_resumes_with_keep() {
    let (fx, store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    let engine = fx.engine();
    engine.set_current_time(4_000);

    fx.handle.surface_destroyed();
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Suspended);
    assert!(!snapshot.polling);
    assert_eq!(snapshot.resume_position_millis, 4_000);
    assert_eq!(store.get("movie"), Some(4_000));
    assert_eq!(engine.count(&EngineCommand::Suspend), 1);
    assert_eq!(engine.count(&EngineCommand::Resume(ResumeMode::Keep)), 0);

    // Repeated destroy is edge-triggered
    fx.handle.surface_destroyed();
    fx.barrier().await;
    assert_eq!(engine.count(&EngineCommand::Suspend), 1);

    fx.handle.surface_available(surface(2));
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Playing);
    assert!(snapshot.polling);
    assert_eq!(engine.count(&EngineCommand::AttachSurface(2)), 1);
    assert_eq!(engine.count(&EngineCommand::Resume(ResumeMode::Keep)), 1);
    assert_eq!(engine.count(&EngineCommand::Start), 1);
}

#[tokio::test(start_paused = true)]
async fn engine_error_requests_close_after_grace() {
    let (mut fx, _store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.drain_events();

    fx.sink().on_error(-38, 0);
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Failed);
    assert!(!snapshot.polling);

    let events = fx.drain_events();
    assert!(events.contains(&SessionEvent::Error {
        code: -38,
        extra: 0,
        message: "error:-38 extra:0".to_string(),
    }));
    assert!(!events.contains(&SessionEvent::CloseRequested));

    advance(2_990).await;
    fx.barrier().await;
    assert!(!fx.drain_events().contains(&SessionEvent::CloseRequested));

    advance(20).await;
    fx.barrier().await;
    assert_eq!(
        count_matching(&fx.drain_events(), |e| *e == SessionEvent::CloseRequested),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn natural_end_clears_position_and_completes_after_grace() {
    let (mut fx, store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.engine().set_current_time(30_000);
    fx.handle.pause().await.unwrap();
    fx.handle.resume().await.unwrap();
    assert_eq!(store.get("movie"), Some(30_000));
    fx.drain_events();

    fx.sink().on_play_ended();
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Completed);
    assert_eq!(snapshot.resume_position_millis, 0);
    assert_eq!(store.get("movie"), None);

    advance(990).await;
    fx.barrier().await;
    assert!(!fx.drain_events().contains(&SessionEvent::Completed));

    advance(20).await;
    fx.barrier().await;
    assert!(fx.drain_events().contains(&SessionEvent::Completed));
}

#[tokio::test(start_paused = true)]
async fn duplicate_surface_availability_attaches_once() {
    let (fx, _store) = Fixture::with_memory_store();
    fx.start_session(&["movie"]).await;

    fx.handle.surface_available(surface(1));
    fx.handle.surface_available(surface(1));
    fx.sink().on_ready();
    fx.barrier().await;

    let engine = fx.engine();
    assert_eq!(engine.count(&EngineCommand::AttachSurface(1)), 1);
    assert_eq!(engine.count(&EngineCommand::Start), 1);
}

#[tokio::test(start_paused = true)]
async fn settings_requested_before_ready_are_applied_once() {
    let (fx, _store) = Fixture::with_memory_store();
    fx.start_session(&["movie"]).await;
    fx.engine().set_settings_not_ready(true);

    fx.handle.set_speed(1.25).await.unwrap();
    fx.handle.set_mute(true).await.unwrap();
    fx.handle.set_volume(0.5).await.unwrap();
    assert!(fx
        .engine()
        .commands()
        .iter()
        .all(|c| !matches!(c, EngineCommand::SetPlaybackSpeed(_))));

    fx.engine().set_settings_not_ready(false);
    fx.handle.surface_available(surface(1));
    fx.sink().on_ready();
    fx.sink().on_ready();
    fx.barrier().await;

    let engine = fx.engine();
    assert_eq!(engine.count(&EngineCommand::SetPlaybackSpeed(1.25)), 1);
    assert_eq!(engine.count(&EngineCommand::SetMute(true)), 1);
    assert_eq!(engine.count(&EngineCommand::SetVolume(0.5)), 1);
    assert_eq!(engine.count(&EngineCommand::Start), 1);

    // After Ready, changes go straight through
    fx.handle.set_speed(2.0).await.unwrap();
    assert_eq!(engine.count(&EngineCommand::SetPlaybackSpeed(2.0)), 1);
}

#[tokio::test(start_paused = true)]
async fn progress_ticks_never_touch_resume_position() {
    let (mut fx, store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.engine().set_current_time(3_000);

    advance(1_600).await;
    let snapshot = fx.barrier().await;

    assert_eq!(
        count_matching(&fx.drain_events(), |e| matches!(e, SessionEvent::Progress(_))),
        3
    );
    assert_eq!(snapshot.resume_position_millis, 0);
    assert_eq!(store.get("movie"), None);
}

#[tokio::test(start_paused = true)]
async fn scrubbing_holds_progress_until_seek() {
    let (mut fx, _store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.handle.begin_scrub().await.unwrap();
    fx.drain_events();

    advance(1_100).await;
    fx.barrier().await;
    assert_eq!(
        count_matching(&fx.drain_events(), |e| matches!(e, SessionEvent::Progress(_))),
        0
    );

    fx.handle.seek_to(12_000).await.unwrap();
    let snapshot = fx.barrier().await;
    assert!(!snapshot.is_scrubbing);
    assert_eq!(fx.engine().count(&EngineCommand::Seek(12_000)), 1);
    assert!(fx.drain_events().iter().any(|e| matches!(
        e,
        SessionEvent::Progress(sample) if sample.position_millis == 12_000
    )));

    // Polling resumes after the settle delay
    fx.engine().set_current_time(12_000);
    advance(510).await;
    fx.barrier().await;
    assert_eq!(
        count_matching(&fx.drain_events(), |e| matches!(e, SessionEvent::Progress(_))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn pause_persists_and_stops_polling() {
    let (mut fx, store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.engine().set_current_time(8_500);

    fx.handle.toggle_play().await.unwrap();
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Paused);
    assert!(!snapshot.polling);
    assert_eq!(store.get("movie"), Some(8_500));
    assert_eq!(fx.engine().count(&EngineCommand::Pause), 1);
    fx.drain_events();

    advance(2_000).await;
    fx.barrier().await;
    assert_eq!(
        count_matching(&fx.drain_events(), |e| matches!(e, SessionEvent::Progress(_))),
        0
    );

    fx.handle.toggle_play().await.unwrap();
    assert_eq!(fx.barrier().await.phase, Phase::Playing);
    assert_eq!(fx.engine().count(&EngineCommand::Resume(ResumeMode::Keep)), 1);
}

#[tokio::test(start_paused = true)]
async fn replay_after_completion_cancels_completed_event() {
    let (mut fx, _store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.sink().on_play_ended();
    fx.barrier().await;

    fx.handle.toggle_play().await.unwrap();
    assert_eq!(fx.barrier().await.phase, Phase::Playing);
    assert_eq!(fx.engine().count(&EngineCommand::Start), 2);
    fx.drain_events();

    advance(1_500).await;
    fx.barrier().await;
    assert!(!fx.drain_events().contains(&SessionEvent::Completed));
}

#[tokio::test(start_paused = true)]
async fn retry_after_failure_uses_fresh_attempt() {
    let (mut fx, _store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    let failed_sink = fx.sink();
    failed_sink.on_error(-1004, -110);
    fx.barrier().await;

    fx.handle.ready().await.unwrap();
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Preparing);
    assert_eq!(snapshot.attempt, 2);
    assert_eq!(fx.factory.created_count(), 2);
    fx.drain_events();

    // The failed attempt's close request never fires
    failed_sink.on_ready();
    advance(3_500).await;
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Preparing);
    assert!(!fx.drain_events().contains(&SessionEvent::CloseRequested));
}

#[tokio::test(start_paused = true)]
async fn precondition_violations_leave_state_alone() {
    let (fx, _store) = Fixture::with_memory_store();
    fx.start_session(&["movie"]).await;

    assert!(matches!(
        fx.handle.ready().await,
        Err(SessionError::Precondition(_))
    ));
    assert!(matches!(
        fx.handle.resume().await,
        Err(SessionError::Precondition(_))
    ));
    assert!(matches!(
        fx.handle.seek_to(1_000).await,
        Err(SessionError::Precondition(_))
    ));

    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Preparing);
    assert_eq!(fx.factory.created_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_engine_and_closes_handle() {
    let (fx, store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.engine().set_current_time(2_500);

    fx.handle.shutdown().await.unwrap();
    let engine = fx.engine();
    assert_eq!(engine.count(&EngineCommand::Release), 1);
    assert_eq!(store.get("movie"), Some(2_500));

    assert_eq!(fx.handle.pause().await, Err(SessionError::ServiceClosed));
}

#[tokio::test(start_paused = true)]
async fn background_persists_and_foreground_restarts_polling() {
    let (mut fx, store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.engine().set_current_time(9_000);

    fx.handle.host_background().await.unwrap();
    let snapshot = fx.barrier().await;
    assert!(!snapshot.polling);
    assert_eq!(snapshot.phase, Phase::Playing);
    assert_eq!(store.get("movie"), Some(9_000));
    fx.drain_events();

    advance(2_000).await;
    fx.barrier().await;
    assert_eq!(
        count_matching(&fx.drain_events(), |e| matches!(e, SessionEvent::Progress(_))),
        0
    );

    fx.handle.host_foreground().await.unwrap();
    assert!(fx.barrier().await.polling);
    advance(510).await;
    fx.barrier().await;
    assert_eq!(
        count_matching(&fx.drain_events(), |e| matches!(e, SessionEvent::Progress(_))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn seek_while_backgrounded_keeps_polling_off() {
    let (mut fx, _store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.handle.host_background().await.unwrap();
    fx.drain_events();

    fx.handle.seek_to(1_000).await.unwrap();
    assert_eq!(fx.engine().count(&EngineCommand::Seek(1_000)), 1);
    fx.drain_events();

    advance(2_100).await;
    let snapshot = fx.barrier().await;
    assert!(!snapshot.polling);
    assert_eq!(
        count_matching(&fx.drain_events(), |e| matches!(e, SessionEvent::Progress(_))),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn playback_restarts_while_backgrounded_keep_polling_off() {
    let (fx, _store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.handle.host_background().await.unwrap();

    fx.handle.surface_destroyed();
    fx.handle.surface_available(surface(2));
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Playing);
    assert!(!snapshot.polling);

    fx.handle.pause().await.unwrap();
    fx.handle.resume().await.unwrap();
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Playing);
    assert!(!snapshot.polling);

    fx.handle.host_foreground().await.unwrap();
    assert!(fx.barrier().await.polling);
}

#[tokio::test(start_paused = true)]
async fn foreground_while_paused_does_not_poll() {
    let (fx, _store) = Fixture::with_memory_store();
    fx.start_playing(&["movie"]).await;
    fx.handle.host_background().await.unwrap();
    fx.handle.pause().await.unwrap();

    fx.handle.host_foreground().await.unwrap();
    let snapshot = fx.barrier().await;
    assert_eq!(snapshot.phase, Phase::Paused);
    assert!(!snapshot.polling);

    // Foreground cleared the background gate, so resume polls again
    fx.handle.resume().await.unwrap();
    assert!(fx.barrier().await.polling);
}
