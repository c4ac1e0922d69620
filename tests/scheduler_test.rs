//! Playlist scheduler integration tests
//!
//! Ticks are driven with explicit timestamps; staging and broadcasting run
//! for real against fixture files.

mod common;

use channelcast::broadcast::SourceState;
use channelcast::catalog::Catalog;
use channelcast::scheduler::Scheduler;
use channelcast::stager::ContentStager;
use chrono::{Duration as Delta, Utc};
use common::*;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn scheduler(library: &Library) -> Scheduler {
    Scheduler::new(library.stager(), fast_scheduler(), fast_broadcast())
}

#[tokio::test]
async fn test_rotation_uses_tick_time() {
    let library = Library::new();
    let fixture_a = Fixture::new(1, 4);
    let fixture_b = Fixture::new(2, 4);
    library.add("a.mp4", &fixture_a);
    library.add("b.mp4", &fixture_b);

    let a = asset("a", 10.0);
    let b = asset("b", 15.0);
    let scheduler = scheduler(&library);
    let ch = channel(1);

    let t0 = Utc::now();
    scheduler.apply_catalog(single_channel_catalog(1, &[a, b]), t0);
    assert!(scheduler.broadcaster(ch).is_none());

    scheduler.tick_at(t0).await;
    let state = scheduler.playback_state(ch).unwrap();
    assert_eq!(state.current.id.as_str(), "a");
    assert_eq!(state.started_at, t0);
    assert_eq!(state.next.as_ref().map(|v| v.id.as_str()), Some("b"));
    assert!(state.current.local_path.is_some());
    let broadcaster = scheduler.broadcaster(ch).expect("channel on air");

    scheduler.tick_at(t0 + Delta::seconds(5)).await;
    assert_eq!(scheduler.playback_state(ch).unwrap().current.id.as_str(), "a");

    let t11 = t0 + Delta::seconds(11);
    scheduler.tick_at(t11).await;
    let state = scheduler.playback_state(ch).unwrap();
    assert_eq!(state.current.id.as_str(), "b");
    assert_eq!(state.started_at, t11);
    assert_eq!(state.next.as_ref().map(|v| v.id.as_str()), Some("a"));

    let now_playing = scheduler.now_playing(ch, t0 + Delta::seconds(12)).unwrap();
    assert_eq!(now_playing.asset_id.as_str(), "b");
    assert_eq!(now_playing.title, "Title b");
    assert!((now_playing.current_time - 1.0).abs() < 1e-9);
    assert_eq!(now_playing.duration, 15.0);

    // a viewer tuning in now gets b's init segment
    let (sink, mut rx, done) = viewer(256);
    tokio::spawn({
        let broadcaster = broadcaster.clone();
        async move { broadcaster.attach_viewer(sink).await }
    });
    let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(&first[..], &fixture_b.init[..]);

    done.cancel();
    scheduler.shutdown();
}

#[tokio::test]
async fn test_prefetch_after_threshold() {
    let library = Library::new();
    library.add("a.mp4", &Fixture::new(1, 2));
    library.add("b.mp4", &Fixture::new(2, 2));

    let scheduler = scheduler(&library);
    let t0 = Utc::now();
    scheduler.apply_catalog(
        single_channel_catalog(1, &[asset("a", 100.0), asset("b", 100.0)]),
        t0,
    );
    scheduler.tick_at(t0).await;
    assert_eq!(library.stager.ensure_count("a.mp4"), 1);

    scheduler.tick_at(t0 + Delta::seconds(79)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(library.stager.ensure_count("b.mp4"), 0);
    assert!(!library.stager.is_local("b.mp4"));

    scheduler.tick_at(t0 + Delta::seconds(81)).await;
    assert!(wait_for(WAIT, || library.stager.is_local("b.mp4")).await);
    assert_eq!(library.stager.ensure_count("b.mp4"), 1);

    scheduler.tick_at(t0 + Delta::seconds(85)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(library.stager.ensure_count("b.mp4"), 1);
    assert_eq!(
        scheduler.playback_state(channel(1)).unwrap().current.id.as_str(),
        "a"
    );

    scheduler.shutdown();
}

#[tokio::test]
async fn test_fatal_source_rotates_early() {
    let library = Library::new();
    library.add_raw("bad.mp4", &Fixture::new(1, 2).corrupt_bytes());
    library.add("good.mp4", &Fixture::new(2, 2));

    let scheduler = scheduler(&library);
    let ch = channel(1);
    let t0 = Utc::now();
    scheduler.apply_catalog(
        single_channel_catalog(1, &[asset("bad", 1000.0), asset("good", 1000.0)]),
        t0,
    );
    scheduler.tick_at(t0).await;

    let broadcaster = scheduler.broadcaster(ch).unwrap();
    assert!(wait_for(WAIT, || broadcaster.source().is_fatal()).await);

    let t1 = t0 + Delta::seconds(1);
    scheduler.tick_at(t1).await;
    let state = scheduler.playback_state(ch).unwrap();
    assert_eq!(state.current.id.as_str(), "good");
    assert_eq!(state.started_at, t1);
    assert!(matches!(broadcaster.source(), SourceState::Playing(_)));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_staging_failure_keeps_current_video() {
    let library = Library::new();
    library.add("a.mp4", &Fixture::new(1, 2));

    let scheduler = scheduler(&library);
    let ch = channel(1);
    let t0 = Utc::now();
    scheduler.apply_catalog(
        single_channel_catalog(1, &[asset("a", 10.0), asset("late", 10.0)]),
        t0,
    );
    scheduler.tick_at(t0).await;

    // next video is not in the library yet: a overruns
    scheduler.tick_at(t0 + Delta::seconds(11)).await;
    scheduler.tick_at(t0 + Delta::seconds(16)).await;
    let state = scheduler.playback_state(ch).unwrap();
    assert_eq!(state.current.id.as_str(), "a");
    assert_eq!(state.started_at, t0);
    assert_eq!(scheduler.now_playing(ch, t0 + Delta::seconds(16)).unwrap().current_time, 10.0);

    library.add("late.mp4", &Fixture::new(2, 2));
    let t21 = t0 + Delta::seconds(21);
    scheduler.tick_at(t21).await;
    let state = scheduler.playback_state(ch).unwrap();
    assert_eq!(state.current.id.as_str(), "late");
    assert_eq!(state.started_at, t21);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_wrap_around() {
    let library = Library::new();
    let ids = ["a", "b", "c"];
    for (i, id) in ids.iter().enumerate() {
        library.add(&format!("{id}.mp4"), &Fixture::new(i as u8 + 1, 2));
    }
    let videos: Vec<_> = ids.iter().map(|id| asset(id, 1.0)).collect();

    // keep every copy staged so rotations never race an eviction
    let config = channelcast::config::SchedulerConfig {
        eviction_grace_secs: 60,
        ..fast_scheduler()
    };
    let scheduler = Scheduler::new(library.stager(), config, fast_broadcast());
    let ch = channel(1);
    let t0 = Utc::now();
    scheduler.apply_catalog(single_channel_catalog(1, &videos), t0);
    scheduler.tick_at(t0).await;

    for n in 1..=8i64 {
        scheduler.tick_at(t0 + Delta::seconds(n)).await;
        let state = scheduler.playback_state(ch).unwrap();
        assert_eq!(
            state.current.id.as_str(),
            ids[n as usize % ids.len()],
            "after {n} rotations"
        );
    }

    scheduler.shutdown();
}

#[tokio::test]
async fn test_finished_video_is_evicted() {
    let library = Library::new();
    library.add("a.mp4", &Fixture::new(1, 2));
    library.add("b.mp4", &Fixture::new(2, 2));

    let scheduler = scheduler(&library);
    let t0 = Utc::now();
    scheduler.apply_catalog(
        single_channel_catalog(1, &[asset("a", 10.0), asset("b", 10.0)]),
        t0,
    );
    scheduler.tick_at(t0).await;
    assert!(library.stager.is_local("a.mp4"));

    scheduler.tick_at(t0 + Delta::seconds(10)).await;
    assert!(wait_for(WAIT, || !library.stager.is_local("a.mp4")).await);
    assert!(library.stager.is_local("b.mp4"));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_single_entry_playlist_not_evicted() {
    let library = Library::new();
    library.add("a.mp4", &Fixture::new(1, 2));

    let scheduler = scheduler(&library);
    let ch = channel(1);
    let t0 = Utc::now();
    scheduler.apply_catalog(single_channel_catalog(1, &[asset("a", 5.0)]), t0);
    scheduler.tick_at(t0).await;

    let t6 = t0 + Delta::seconds(6);
    scheduler.tick_at(t6).await;
    let state = scheduler.playback_state(ch).unwrap();
    assert_eq!(state.current.id.as_str(), "a");
    assert_eq!(state.started_at, t6);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(library.stager.is_local("a.mp4"));
    assert_eq!(library.stager.evict_count("a.mp4"), 0);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_shared_asset_kept_while_on_air() {
    let library = Library::new();
    library.add("a.mp4", &Fixture::new(1, 2));
    library.add("b.mp4", &Fixture::new(2, 2));

    let a = asset("a", 10.0);
    let b = asset("b", 10.0);
    let mut catalog = single_channel_catalog(1, &[a.clone(), b.clone()]);
    catalog.insert_channel(channelcast_common::Channel::new(
        channel(2),
        "Reruns",
        vec![a.id.clone()],
    ));

    let scheduler = scheduler(&library);
    let t0 = Utc::now();
    scheduler.apply_catalog(catalog, t0);
    scheduler.tick_at(t0).await;

    // channel 1 finishes a while channel 2 is still playing it
    scheduler.tick_at(t0 + Delta::seconds(10)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(library.stager.is_local("a.mp4"));
    assert_eq!(
        scheduler.playback_state(channel(1)).unwrap().current.id.as_str(),
        "b"
    );

    scheduler.shutdown();
}

#[tokio::test]
async fn test_bring_up_retries_until_staged() {
    let library = Library::new();
    let scheduler = scheduler(&library);
    let ch = channel(3);
    let t0 = Utc::now();
    scheduler.apply_catalog(single_channel_catalog(3, &[asset("a", 30.0)]), t0);

    scheduler.tick_at(t0).await;
    assert!(scheduler.broadcaster(ch).is_none());
    assert_eq!(scheduler.playback_state(ch).unwrap().started_at, t0);

    library.add("a.mp4", &Fixture::new(1, 2));
    let t5 = t0 + Delta::seconds(5);
    scheduler.tick_at(t5).await;
    assert!(scheduler.broadcaster(ch).is_some());
    assert_eq!(scheduler.playback_state(ch).unwrap().started_at, t5);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_unstageable_video_is_skipped() {
    let library = Library::new();
    library.add_raw("a.mp4", &progressive_bytes());
    library.add("b.mp4", &Fixture::new(2, 2));

    let scheduler = scheduler(&library);
    let ch = channel(1);
    let t0 = Utc::now();
    scheduler.apply_catalog(
        single_channel_catalog(1, &[asset("a", 10.0), asset("b", 10.0)]),
        t0,
    );

    scheduler.tick_at(t0).await;
    let state = scheduler.playback_state(ch).unwrap();
    assert_eq!(state.current.id.as_str(), "b");
    assert_eq!(state.started_at, t0);
    assert_eq!(state.next.as_ref().map(|v| v.id.as_str()), Some("a"));
    assert!(scheduler.broadcaster(ch).is_some());
    assert_eq!(library.stager.ensure_count("b.mp4"), 1);
    assert_eq!(
        scheduler.now_playing(ch, t0).unwrap().asset_id.as_str(),
        "b"
    );

    scheduler.shutdown();
}

#[tokio::test]
async fn test_unprimeable_video_is_skipped() {
    // stages fine but its init segment does not fit the broadcaster's probe
    let mut oversized = boxed(b"ftyp", b"iso6");
    oversized.extend(boxed(b"moov", &vec![0u8; 128 * 1024]));
    for fragment in Fixture::new(1, 2).fragments {
        oversized.extend(fragment);
    }

    let library = Library::new();
    library.add_raw("a.mp4", &oversized);
    library.add("b.mp4", &Fixture::new(2, 2));

    let scheduler = scheduler(&library);
    let ch = channel(1);
    let t0 = Utc::now();
    scheduler.apply_catalog(
        single_channel_catalog(1, &[asset("a", 10.0), asset("b", 10.0)]),
        t0,
    );

    scheduler.tick_at(t0).await;
    assert_eq!(scheduler.playback_state(ch).unwrap().current.id.as_str(), "b");
    assert!(scheduler.broadcaster(ch).is_some());
    assert_eq!(library.stager.evict_count("a.mp4"), 1);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_offline_channel_moves_on_after_slot_ends() {
    let library = Library::new();
    // reading a directory fails with an I/O error, which is worth retrying
    std::fs::create_dir_all(library.source_dir().join("a.mp4")).unwrap();

    let scheduler = scheduler(&library);
    let ch = channel(1);
    let t0 = Utc::now();
    scheduler.apply_catalog(
        single_channel_catalog(1, &[asset("a", 10.0), asset("b", 10.0)]),
        t0,
    );

    // a keeps its slot while it lasts
    scheduler.tick_at(t0).await;
    scheduler.tick_at(t0 + Delta::seconds(5)).await;
    assert_eq!(scheduler.playback_state(ch).unwrap().current.id.as_str(), "a");
    assert!(scheduler.broadcaster(ch).is_none());
    assert_eq!(library.stager.ensure_count("a.mp4"), 2);

    library.add("b.mp4", &Fixture::new(2, 2));
    let t11 = t0 + Delta::seconds(11);
    scheduler.tick_at(t11).await;
    let state = scheduler.playback_state(ch).unwrap();
    assert_eq!(state.current.id.as_str(), "b");
    assert_eq!(state.started_at, t11);
    assert!(scheduler.broadcaster(ch).is_some());

    scheduler.shutdown();
}

#[tokio::test]
async fn test_failed_switch_keeps_copy_another_channel_plays() {
    let library = Library::new();
    library.add("b.mp4", &Fixture::new(2, 2));
    library.add("s.mp4", &Fixture::new(3, 2));

    let b = asset("b", 10.0);
    let shared = asset("s", 100.0);
    let mut catalog = single_channel_catalog(1, &[shared.clone()]);
    for video in [&b, &shared] {
        catalog.insert_asset(video.clone());
    }
    catalog.insert_channel(channelcast_common::Channel::new(
        channel(2),
        "Second",
        vec![b.id.clone(), shared.id.clone()],
    ));

    let scheduler = scheduler(&library);
    let t0 = Utc::now();
    scheduler.apply_catalog(catalog, t0);
    scheduler.tick_at(t0).await;
    assert!(scheduler.broadcaster(channel(1)).is_some());
    assert!(scheduler.broadcaster(channel(2)).is_some());

    // the staged copy goes bad, so channel 2 cannot switch to it
    std::fs::write(library.cache_path("s.mp4"), progressive_bytes()).unwrap();
    scheduler.tick_at(t0 + Delta::seconds(11)).await;

    assert_eq!(
        scheduler.playback_state(channel(2)).unwrap().current.id.as_str(),
        "b"
    );
    assert_eq!(
        scheduler.playback_state(channel(1)).unwrap().current.id.as_str(),
        "s"
    );
    assert_eq!(library.stager.evict_count("s.mp4"), 0);
    assert!(library.stager.is_local("s.mp4"));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_elapsed_is_clamped() {
    let library = Library::new();
    library.add("a.mp4", &Fixture::new(1, 2));
    let scheduler = scheduler(&library);
    let ch = channel(1);
    let t0 = Utc::now();
    scheduler.apply_catalog(single_channel_catalog(1, &[asset("a", 120.0)]), t0);

    let readout = scheduler.now_playing(ch, t0 + Delta::seconds(100)).unwrap();
    assert_eq!(readout.current_time, 100.0);
    assert_eq!(scheduler.now_playing(ch, t0 + Delta::seconds(300)).unwrap().current_time, 120.0);
    assert_eq!(scheduler.now_playing(ch, t0 - Delta::seconds(3)).unwrap().current_time, 0.0);
    assert!(scheduler.now_playing(channel(9), t0).is_none());
}

#[tokio::test]
async fn test_apply_catalog_adds_and_removes_channels() {
    let library = Library::new();
    library.add("a.mp4", &Fixture::new(1, 2));
    library.add("b.mp4", &Fixture::new(2, 2));

    let scheduler = scheduler(&library);
    let t0 = Utc::now();
    scheduler.apply_catalog(single_channel_catalog(1, &[asset("a", 10.0)]), t0);
    scheduler.tick_at(t0).await;
    let old = scheduler.broadcaster(channel(1)).unwrap();

    let t3 = t0 + Delta::seconds(3);
    scheduler.apply_catalog(single_channel_catalog(2, &[asset("b", 10.0)]), t3);
    assert!(scheduler.playback_state(channel(1)).is_none());
    assert!(scheduler.broadcaster(channel(1)).is_none());

    let (sink, _rx, _done) = viewer(16);
    tokio::time::timeout(WAIT, old.attach_viewer(sink))
        .await
        .expect("stopped broadcaster releases viewers")
        .ok();

    let state = scheduler.playback_state(channel(2)).unwrap();
    assert_eq!(state.current.id.as_str(), "b");
    assert_eq!(state.started_at, t3);

    scheduler.tick_at(t3).await;
    assert!(scheduler.broadcaster(channel(2)).is_some());
    assert_eq!(scheduler.channel_ids(), vec![channel(2)]);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_refresh_keeps_running_video() {
    let library = Library::new();
    library.add("a.mp4", &Fixture::new(1, 2));
    library.add("b.mp4", &Fixture::new(2, 2));

    let scheduler = scheduler(&library);
    let ch = channel(1);
    let t0 = Utc::now();
    scheduler.apply_catalog(single_channel_catalog(1, &[asset("a", 10.0), asset("b", 10.0)]), t0);
    scheduler.tick_at(t0).await;

    // b dropped from the playlist, a deleted entirely
    let mut catalog = Catalog::new();
    catalog.insert_asset(asset("b", 10.0));
    catalog.insert_channel(channelcast_common::Channel::new(ch, "One", vec!["b".into()]));
    scheduler.apply_catalog(catalog, t0 + Delta::seconds(2));

    let state = scheduler.playback_state(ch).unwrap();
    assert_eq!(state.current.id.as_str(), "a");
    assert_eq!(state.started_at, t0);
    assert_eq!(state.next.as_ref().map(|v| v.id.as_str()), Some("b"));

    scheduler.tick_at(t0 + Delta::seconds(10)).await;
    assert_eq!(scheduler.playback_state(ch).unwrap().current.id.as_str(), "b");

    scheduler.shutdown();
}

#[tokio::test]
async fn test_guide_lists_every_channel() {
    let library = Library::new();
    library.add("a.mp4", &Fixture::new(1, 2));

    let mut catalog = single_channel_catalog(1, &[asset("a", 10.0)]);
    catalog.insert_channel(channelcast_common::Channel::new(channel(2), "Empty", Vec::new()));

    let scheduler = scheduler(&library);
    let t0 = Utc::now();
    scheduler.apply_catalog(catalog, t0);
    scheduler.tick_at(t0).await;

    let guide = scheduler.guide(t0 + Delta::seconds(4));
    assert_eq!(guide.len(), 2);
    assert_eq!(guide[0].channel_number, channel(1));
    assert!(guide[0].live);
    assert_eq!(guide[0].current.as_ref().unwrap().id.as_str(), "a");
    assert_eq!(guide[0].current_time, Some(4.0));

    // empty playlist falls back to a catalog asset
    assert_eq!(guide[1].name, "Empty");
    assert_eq!(guide[1].current.as_ref().unwrap().id.as_str(), "a");

    scheduler.shutdown();
}
