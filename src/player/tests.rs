//! Player scenarios
//!
//! Every test runs on a paused clock so the append timer and the locator's
//! poll interval advance deterministically.

use super::*;
use crate::PlayerError;
use crate::test_utils::{MockFeed, RecordingSink, SinkEvent, cluster_payload, filler_payload, metadata_payload};
use crate::types::DEFAULT_MIME_TYPE;
use futures::StreamExt;

const TIMESLICE: Duration = Duration::from_millis(100);

fn options() -> PlayerOptions {
    PlayerOptions::default().with_timeslice(TIMESLICE).with_look_ahead(2)
}

fn index(value: u64) -> FeedIndex {
    FeedIndex::new(value)
}

/// Metadata at index zero, fillers up to `cluster_at`, a cluster at
/// `cluster_at` that is also the feed head.
fn live_feed(cluster_at: u64, cluster_offset: usize) -> Arc<MockFeed> {
    let feed = MockFeed::new();
    feed.publish(FeedIndex::FIRST, metadata_payload(1_000_000));
    for i in 1..cluster_at {
        feed.publish(index(i), filler_payload(i, 48));
    }
    feed.publish(index(cluster_at), cluster_payload(cluster_offset, 4_000));
    Arc::new(feed)
}

fn attach(feed: &Arc<MockFeed>, sink: &Arc<RecordingSink>, options: PlayerOptions) -> FeedPlayer {
    FeedPlayer::attach(feed.clone(), sink.clone(), options).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test(start_paused = true)]
async fn init_segment_precedes_segment_appends() {
    init_tracing();
    let feed = live_feed(3, 17);
    let sink = Arc::new(RecordingSink::new());
    let player = attach(&feed, &sink, options());

    player.play().await.unwrap();
    feed.publish(index(4), filler_payload(4, 48));
    feed.publish(index(5), filler_payload(5, 48));
    tokio::time::sleep(Duration::from_millis(350)).await;

    let metadata = feed.payload(FeedIndex::FIRST).unwrap();
    let cluster = feed.payload(index(3)).unwrap();
    let mut expected_init = metadata.clone();
    expected_init.extend_from_slice(&cluster[17..]);

    let events = sink.events();
    assert_eq!(events[0], SinkEvent::Opened(DEFAULT_MIME_TYPE.to_string()));
    match events[1] {
        SinkEvent::Clock(seconds) => assert!((seconds - 4.0).abs() < 1e-9),
        ref other => panic!("expected clock position, got {other:?}"),
    }
    assert_eq!(events[2], SinkEvent::Append(expected_init));
    assert_eq!(events[3], SinkEvent::Play);

    let appends = sink.appends();
    assert_eq!(appends.len(), 3);
    assert_eq!(appends[1], feed.payload(index(4)).unwrap());
    assert_eq!(appends[2], feed.payload(index(5)).unwrap());

    let state = player.state();
    assert_eq!(state.current_index, Some(index(6)));
    assert!(state.is_playing);
    assert!(!state.is_loading);
    assert_eq!(state.phase, PlaybackPhase::Playing);

    let meta = player.cluster_meta().unwrap();
    assert!((meta.time_scale_seconds - 0.001).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn unpublished_index_holds_position_until_published() {
    let feed = live_feed(3, 0);
    let sink = Arc::new(RecordingSink::new());
    let player = attach(&feed, &sink, options());

    player.play().await.unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(player.state().current_index, Some(index(4)));
    assert_eq!(sink.appends().len(), 1);

    feed.publish(index(4), filler_payload(4, 48));
    tokio::time::sleep(Duration::from_millis(400)).await;

    let appends = sink.appends();
    assert_eq!(appends.len(), 2);
    assert_eq!(appends[1], feed.payload(index(4)).unwrap());
    assert_eq!(player.state().current_index, Some(index(5)));
}

#[tokio::test(start_paused = true)]
async fn look_ahead_segment_published_late_is_appended_on_its_tick() {
    let feed = live_feed(3, 0);
    feed.publish(index(4), filler_payload(4, 48));
    let sink = Arc::new(RecordingSink::new());
    let player = attach(&feed, &sink, options());

    // The first tick fetches 4 and 5 while 5 is still missing
    player.play().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(feed.fetch_count(index(5)), 1);
    feed.publish(index(5), filler_payload(5, 48));

    tokio::time::sleep(Duration::from_millis(300)).await;

    let appends = sink.appends();
    assert_eq!(appends.len(), 3);
    assert_eq!(appends[2], feed.payload(index(5)).unwrap());
    assert_eq!(player.state().current_index, Some(index(6)));
    assert_eq!(feed.fetch_count(index(5)), 2);
}

#[tokio::test(start_paused = true)]
async fn seek_restarts_from_nearest_cluster_below_target() {
    let feed = MockFeed::new();
    feed.publish(FeedIndex::FIRST, metadata_payload(1_000_000));
    for i in 1..30 {
        let payload = match i {
            10 => cluster_payload(3, 20_000),
            20 => cluster_payload(5, 40_000),
            29 => cluster_payload(7, 58_000),
            _ => filler_payload(i, 48),
        };
        feed.publish(index(i), payload);
    }
    let feed = Arc::new(feed);
    let sink = Arc::new(RecordingSink::new());
    let player = attach(&feed, &sink, options());

    player.play().await.unwrap();
    assert_eq!(player.state().current_index, Some(index(30)));

    player.seek(index(25)).await.unwrap();

    let state = player.state();
    assert_eq!(state.current_index, Some(index(21)));
    assert_eq!(state.seek_target, None);
    assert!((player.cluster_meta().unwrap().cluster_timestamp_seconds - 40.0).abs() < 1e-9);

    let events = sink.events();
    let reset = events.iter().position(|e| *e == SinkEvent::Reset).unwrap();
    assert_eq!(events[reset + 1], SinkEvent::Opened(DEFAULT_MIME_TYPE.to_string()));

    let cluster = feed.payload(index(20)).unwrap();
    let mut expected_init = feed.payload(FeedIndex::FIRST).unwrap();
    expected_init.extend_from_slice(&cluster[5..]);
    assert_eq!(events[reset + 3], SinkEvent::Append(expected_init));

    // Metadata is fetched once per session
    assert_eq!(feed.fetch_count(FeedIndex::FIRST), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_seek_is_reported_and_session_stays_usable() {
    let feed = live_feed(20, 0);
    let sink = Arc::new(RecordingSink::new());
    let player = attach(&feed, &sink, options().with_max_backward_steps(4));

    let err = player.seek(index(10)).await.unwrap_err();
    assert!(matches!(err, PlayerError::NoClusterFound { steps: 4, .. }));

    let state = player.state();
    assert!(!state.is_loading);
    assert_eq!(state.seek_target, None);
    assert!(!player.events().current(PlayerSignal::LoadingPlaying));

    player.play().await.unwrap();
    assert_eq!(player.state().current_index, Some(index(21)));
}

#[tokio::test(start_paused = true)]
async fn seek_recorded_during_failing_play_survives_for_next_attempt() {
    let feed = MockFeed::new();
    feed.publish(FeedIndex::FIRST, metadata_payload(1_000_000));
    feed.publish(index(1), filler_payload(1, 48));
    let feed = Arc::new(feed);
    let sink = Arc::new(RecordingSink::new());
    let player = Arc::new(attach(&feed, &sink, options()));

    let first = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.play().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    player.seek(index(6)).await.unwrap();
    assert_eq!(player.state().seek_target, Some(index(6)));

    // The running forward search hits a broken cluster at 2
    let mut broken = container::CLUSTER_ID.to_vec();
    broken.extend_from_slice(&[0x81, 0xa3]);
    feed.publish(index(2), broken);
    for i in 3..7 {
        let payload = if i == 5 { cluster_payload(4, 10_000) } else { filler_payload(i, 48) };
        feed.publish(index(i), payload);
    }

    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, PlayerError::MalformedContainer { .. }));
    assert_eq!(player.state().seek_target, Some(index(6)));

    player.play().await.unwrap();
    let state = player.state();
    assert_eq!(state.current_index, Some(index(6)));
    assert_eq!(state.seek_target, None);
    assert!((player.cluster_meta().unwrap().cluster_timestamp_seconds - 10.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn malformed_cluster_fails_play_and_clears_loading() {
    let feed = MockFeed::new();
    feed.publish(FeedIndex::FIRST, metadata_payload(1_000_000));
    let mut broken = container::CLUSTER_ID.to_vec();
    broken.extend_from_slice(&[0x81, 0xa3]);
    feed.publish(index(1), broken);
    let feed = Arc::new(feed);
    let sink = Arc::new(RecordingSink::new());
    let player = attach(&feed, &sink, options());

    let err = player.play().await.unwrap_err();
    assert!(matches!(err, PlayerError::MalformedContainer { .. }));
    assert!(!player.state().is_loading);
    assert!(sink.appends().is_empty());

    feed.publish(index(2), cluster_payload(0, 1_000));
    player.play().await.unwrap();
    assert_eq!(sink.appends().len(), 1);
    assert_eq!(player.state().current_index, Some(index(3)));
}

#[tokio::test(start_paused = true)]
async fn play_while_loading_is_ignored() {
    let feed = MockFeed::new();
    feed.publish(FeedIndex::FIRST, metadata_payload(1_000_000));
    feed.publish(index(1), filler_payload(1, 48));
    let feed = Arc::new(feed);
    let sink = Arc::new(RecordingSink::new());
    let player = Arc::new(attach(&feed, &sink, options()));

    let first = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.play().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(player.state().is_loading);
    assert!(player.events().current(PlayerSignal::LoadingPlaying));
    player.play().await.unwrap();
    assert!(player.state().is_loading);

    feed.publish(index(2), cluster_payload(0, 1_000));
    first.await.unwrap().unwrap();

    let opened = sink.events().iter().filter(|e| matches!(e, SinkEvent::Opened(_))).count();
    assert_eq!(opened, 1);
    assert_eq!(sink.appends().len(), 1);
    assert!(!player.events().current(PlayerSignal::LoadingPlaying));
    assert!(player.events().current(PlayerSignal::IsPlaying));
}

#[tokio::test(start_paused = true)]
async fn pause_stops_appends_and_continue_resumes_in_place() {
    let feed = live_feed(3, 0);
    for i in 4..10 {
        feed.publish(index(i), filler_payload(i, 48));
    }
    let sink = Arc::new(RecordingSink::new());
    let player = attach(&feed, &sink, options());

    player.play().await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(sink.appends().len(), 2);

    player.pause().await.unwrap();
    assert!(!player.events().current(PlayerSignal::IsPlaying));
    assert_eq!(player.state().phase, PlaybackPhase::Paused);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.appends().len(), 2);
    assert_eq!(sink.events().last(), Some(&SinkEvent::Pause));

    player.continue_playback().await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let appends = sink.appends();
    assert_eq!(appends.len(), 4);
    assert_eq!(appends[2], feed.payload(index(5)).unwrap());
    assert_eq!(appends[3], feed.payload(index(6)).unwrap());
    assert_eq!(sink.clock_positions().len(), 1);
    assert!(player.state().is_playing);
}

#[tokio::test(start_paused = true)]
async fn pause_during_initialization_keeps_session_paused() {
    let feed = MockFeed::new();
    feed.publish(FeedIndex::FIRST, metadata_payload(1_000_000));
    feed.publish(index(1), filler_payload(1, 48));
    let feed = Arc::new(feed);
    let sink = Arc::new(RecordingSink::new());
    let player = Arc::new(attach(&feed, &sink, options()));

    let loading = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.play().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    player.pause().await.unwrap();
    assert!(player.state().is_loading);

    feed.publish(index(2), cluster_payload(0, 1_000));
    for i in 3..8 {
        feed.publish(index(i), filler_payload(i, 48));
    }
    loading.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let events = sink.events();
    let paused_at = events.iter().position(|e| *e == SinkEvent::Pause).unwrap();
    assert!(!events[paused_at..].contains(&SinkEvent::Play));
    assert_eq!(sink.appends().len(), 1);

    let state = player.state();
    assert!(!state.is_playing);
    assert!(!state.is_loading);
    assert_eq!(state.phase, PlaybackPhase::Paused);
    assert_eq!(state.current_index, Some(index(3)));
    assert!(!player.events().current(PlayerSignal::IsPlaying));
    assert!(!player.events().current(PlayerSignal::LoadingPlaying));

    player.continue_playback().await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let appends = sink.appends();
    assert_eq!(appends.len(), 2);
    assert_eq!(appends[1], feed.payload(index(3)).unwrap());
    assert!(player.state().is_playing);
}

#[tokio::test(start_paused = true)]
async fn restart_waits_for_in_flight_append_before_reset() {
    let feed = live_feed(3, 0);
    let sink = Arc::new(RecordingSink::new().with_append_latency(Duration::from_millis(150)));
    let player = attach(&feed, &sink, options());

    player.play().await.unwrap();
    for i in 4..10 {
        feed.publish(index(i), filler_payload(i, 48));
    }
    feed.publish(index(10), cluster_payload(2, 20_000));

    // One append of index 4 is in flight at this point
    tokio::time::sleep(Duration::from_millis(250)).await;
    player.restart().await.unwrap();

    let events = sink.events();
    let reset = events.iter().position(|e| *e == SinkEvent::Reset).unwrap();
    assert!(events[..reset].contains(&SinkEvent::Append(feed.payload(index(4)).unwrap())));
    assert_eq!(events[reset + 1], SinkEvent::Opened(DEFAULT_MIME_TYPE.to_string()));

    let metadata = feed.payload(FeedIndex::FIRST).unwrap();
    let first_after_reset = events[reset..]
        .iter()
        .find_map(|e| match e {
            SinkEvent::Append(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .unwrap();
    assert!(first_after_reset.starts_with(&metadata));
    assert_eq!(player.state().current_index, Some(index(11)));
    assert_eq!(feed.fetch_count(FeedIndex::FIRST), 1);
}

#[tokio::test(start_paused = true)]
async fn approx_duration_scales_head_index_by_timeslice() {
    let feed = live_feed(3, 0);
    let sink = Arc::new(RecordingSink::new());
    let player = attach(&feed, &sink, options());

    let duration = player.approx_duration().await.unwrap();
    assert_eq!(duration.index, index(3));
    assert_eq!(duration.duration, Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn detach_ends_event_subscriptions() {
    let feed = live_feed(3, 0);
    let sink = Arc::new(RecordingSink::new());
    let player = attach(&feed, &sink, options());
    let stream = player.events().subscribe(PlayerSignal::IsPlaying);

    player.play().await.unwrap();
    player.detach().await;

    let values = tokio::time::timeout(Duration::from_secs(1), stream.collect::<Vec<_>>()).await.unwrap();
    assert_eq!(values.last(), Some(&true));

    let appends = sink.appends().len();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.appends().len(), appends);
}

#[tokio::test(start_paused = true)]
async fn cancelled_session_aborts_cluster_search() {
    let feed = MockFeed::new();
    feed.publish(FeedIndex::FIRST, metadata_payload(1_000_000));
    let feed = Arc::new(feed);
    let sink = Arc::new(RecordingSink::new());
    let player = Arc::new(attach(&feed, &sink, options()));

    let search = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.play().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    player.session.cancel.cancel();

    let err = search.await.unwrap().unwrap_err();
    assert!(matches!(err, PlayerError::Cancelled { .. }));
}

#[test]
fn attach_rejects_invalid_options() {
    let feed = Arc::new(MockFeed::new());
    let sink = Arc::new(RecordingSink::new());

    let err = FeedPlayer::attach(feed, sink, options().with_look_ahead(0)).unwrap_err();
    assert!(matches!(err, PlayerError::Configuration { ref field, .. } if field == "look_ahead"));
}
