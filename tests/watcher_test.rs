//! Integration tests for watch-mode discovery against the in-memory ensemble

mod common;

use common::{ensemble, fast_config, join, settle, wait_for_url, ELECTION_PATH};
use leader_finder::advertisement::{LeaderAddress, SOH};
use leader_finder::coordination::{CoordinationError, SessionEvent, SessionState};
use leader_finder::error::Error;
use leader_finder::finder::{Finder, FinderMode};
use std::time::Duration;

/// The lowest sequence number wins, not the first or last registered
#[tokio::test]
async fn test_lowest_sequence_is_leader() {
    let ensemble = ensemble();
    ensemble.create_path(&format!("{ELECTION_PATH}/member_0000000005"));
    ensemble.create_path(&format!("{ELECTION_PATH}/member_0000000002"));
    ensemble.create_path(&format!("{ELECTION_PATH}/member_0000000009"));
    ensemble
        .set_data(
            &format!("{ELECTION_PATH}/member_0000000005"),
            common::payload("10.0.0.5", 8081),
        )
        .unwrap();
    ensemble
        .set_data(
            &format!("{ELECTION_PATH}/member_0000000002"),
            common::payload("10.0.0.2", 8081),
        )
        .unwrap();
    ensemble
        .set_data(
            &format!("{ELECTION_PATH}/member_0000000009"),
            common::payload("10.0.0.9", 8081),
        )
        .unwrap();

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    assert_eq!(finder.mode(), FinderMode::Watch);

    wait_for_url(&finder, "http://10.0.0.2:8081").await;
    finder.shutdown().await.unwrap();
}

/// Queries before the first successful refresh fail instead of blocking
#[tokio::test]
async fn test_no_leader_before_first_refresh() {
    let ensemble = ensemble();
    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();

    let err = finder.leader_url().await.unwrap_err();
    assert!(matches!(err, Error::Resolution { .. }));
    assert!(err.to_string().contains("no leader found"));

    finder.shutdown().await.unwrap();
}

/// Deleting the leader hands leadership to the next member
#[tokio::test]
async fn test_failover_to_next_member() {
    let ensemble = ensemble();
    let first = join(&ensemble, "10.0.0.1", 8081);
    join(&ensemble, "10.0.0.2", 8082);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;

    let mut changes = finder.subscribe().unwrap();
    changes.borrow_and_update();

    ensemble.delete(&first).unwrap();
    tokio::time::timeout(Duration::from_secs(5), changes.changed())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        changes.borrow().clone(),
        Some(LeaderAddress::new("10.0.0.2", 8082))
    );
    assert_eq!(finder.leader_url().await.unwrap(), "http://10.0.0.2:8082");

    finder.shutdown().await.unwrap();
}

/// Losing every member keeps the last known leader
#[tokio::test]
async fn test_deleting_last_member_keeps_cache() {
    let ensemble = ensemble();
    let only = join(&ensemble, "10.0.0.1", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;

    ensemble.delete(&only).unwrap();
    settle().await;

    assert_eq!(finder.leader_url().await.unwrap(), "http://10.0.0.1:8081");

    // A new member is picked up once it registers
    join(&ensemble, "10.0.0.3", 8081);
    wait_for_url(&finder, "http://10.0.0.3:8081").await;

    finder.shutdown().await.unwrap();
}

/// A placeholder payload is never published
#[tokio::test]
async fn test_soh_placeholder_keeps_previous_leader() {
    let ensemble = ensemble();
    let leader = join(&ensemble, "10.0.0.1", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;

    ensemble.set_data(&leader, vec![SOH]).unwrap();
    settle().await;
    assert_eq!(finder.leader_url().await.unwrap(), "http://10.0.0.1:8081");

    ensemble.set_data(&leader, "{not json").unwrap();
    settle().await;
    assert_eq!(finder.leader_url().await.unwrap(), "http://10.0.0.1:8081");

    finder.shutdown().await.unwrap();
}

/// A member that starts with a placeholder becomes visible once it advertises
#[tokio::test]
async fn test_placeholder_then_advertisement() {
    let ensemble = ensemble();
    let leader = ensemble
        .create_sequential(ELECTION_PATH, "member_", vec![SOH])
        .unwrap();

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    settle().await;
    assert!(finder.leader_url().await.is_err());

    ensemble
        .set_data(&leader, common::payload("10.0.0.4", 8081))
        .unwrap();
    wait_for_url(&finder, "http://10.0.0.4:8081").await;

    finder.shutdown().await.unwrap();
}

/// New data on the leader node is republished
#[tokio::test]
async fn test_data_change_is_republished() {
    let ensemble = ensemble();
    let leader = join(&ensemble, "10.0.0.1", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;

    ensemble
        .set_data(&leader, common::payload("10.0.0.1", 9090))
        .unwrap();
    wait_for_url(&finder, "http://10.0.0.1:9090").await;

    finder.shutdown().await.unwrap();
}

/// Listing failures are retried and never clear the cache
#[tokio::test]
async fn test_listing_failure_keeps_cache() {
    let ensemble = ensemble();
    let first = join(&ensemble, "10.0.0.1", 8081);
    join(&ensemble, "10.0.0.2", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;

    ensemble.set_failure(Some(CoordinationError::ConnectionLoss));
    ensemble.delete(&first).unwrap();
    settle().await;
    assert_eq!(finder.leader_url().await.unwrap(), "http://10.0.0.1:8081");

    let failed_requests = ensemble.request_count();
    settle().await;
    assert!(ensemble.request_count() > failed_requests, "watcher stopped retrying");

    ensemble.set_failure(None);
    wait_for_url(&finder, "http://10.0.0.2:8081").await;

    finder.shutdown().await.unwrap();
}

/// A broken watch triggers a fresh lookup
#[tokio::test]
async fn test_watcher_error_relocates() {
    let ensemble = ensemble();
    let leader = join(&ensemble, "10.0.0.1", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;
    settle().await;
    assert_eq!(ensemble.watch_count(&leader), 1);

    let before = ensemble.request_count();
    ensemble.break_watches(&leader, "connection reset");
    settle().await;

    assert!(ensemble.request_count() > before);
    assert_eq!(ensemble.watch_count(&leader), 1);
    assert_eq!(finder.leader_url().await.unwrap(), "http://10.0.0.1:8081");

    finder.shutdown().await.unwrap();
}

/// A stable leader is not polled while its watch is armed
#[tokio::test]
async fn test_idle_while_watch_armed() {
    let ensemble = ensemble();
    let leader = join(&ensemble, "10.0.0.1", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;
    settle().await;

    let requests = ensemble.request_count();
    settle().await;
    assert_eq!(ensemble.request_count(), requests);
    assert_eq!(ensemble.watch_count(&leader), 1);

    finder.shutdown().await.unwrap();
}

/// Session events are observed but never touch the cache
#[tokio::test]
async fn test_session_events_do_not_change_leader() {
    let ensemble = ensemble();
    join(&ensemble, "10.0.0.1", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;

    ensemble.emit_session_event(SessionEvent::new(SessionState::Disconnected, "zk1:2181"));
    ensemble.emit_session_event(SessionEvent::new(SessionState::Expired, "zk1:2181"));
    settle().await;

    assert_eq!(finder.leader_url().await.unwrap(), "http://10.0.0.1:8081");
    let Finder::Watch(watch) = &finder else {
        panic!("expected watch mode");
    };
    assert!(watch.is_running());

    finder.shutdown().await.unwrap();
}

/// Snapshot exposes the advertised status and a fresh age
#[tokio::test]
async fn test_snapshot_reports_leader() {
    let ensemble = ensemble();
    join(&ensemble, "10.0.0.1", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;

    let snapshot = finder.snapshot().await.unwrap();
    assert_eq!(snapshot.address, LeaderAddress::new("10.0.0.1", 8081));
    assert!(snapshot.age < Duration::from_secs(5));

    finder.shutdown().await.unwrap();
}

/// The election path embedded in the address is honoured
#[tokio::test]
async fn test_election_path_from_address() {
    let ensemble = leader_finder::coordination::MemoryEnsemble::new();
    ensemble.create_path("/jobs/leader");
    ensemble
        .create_sequential("/jobs/leader", "member_", common::payload("10.1.0.1", 7000))
        .unwrap();

    let config = leader_finder::config::FinderConfig::builder()
        .address("zk://zk1:2181/jobs/leader")
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    let finder = Finder::resolve(&config, &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.1.0.1:7000").await;

    finder.shutdown().await.unwrap();
}

/// Shutdown stops the watcher; later changes are not observed
#[tokio::test]
async fn test_shutdown_stops_refresh() {
    let ensemble = ensemble();
    join(&ensemble, "10.0.0.1", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;

    tokio::time::timeout(Duration::from_secs(5), finder.shutdown())
        .await
        .unwrap()
        .unwrap();

    let requests = ensemble.request_count();
    settle().await;
    assert_eq!(ensemble.request_count(), requests);
}

/// Refused sessions fail construction with a connection error
#[tokio::test]
async fn test_refused_connection() {
    let ensemble = ensemble();
    ensemble.refuse_connections(true);

    let err = Finder::resolve(&fast_config(), &ensemble).await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }), "got {err:?}");
    assert!(err.is_recoverable());
}

/// Non-numeric member suffixes are reported, not guessed around
#[tokio::test]
async fn test_invalid_member_name_keeps_cache() {
    let ensemble = ensemble();
    let first = join(&ensemble, "10.0.0.1", 8081);
    join(&ensemble, "10.0.0.2", 8081);

    let finder = Finder::resolve(&fast_config(), &ensemble).await.unwrap();
    wait_for_url(&finder, "http://10.0.0.1:8081").await;

    ensemble.create_path(&format!("{ELECTION_PATH}/member_abc"));
    ensemble.delete(&first).unwrap();
    settle().await;
    assert_eq!(finder.leader_url().await.unwrap(), "http://10.0.0.1:8081");

    finder.shutdown().await.unwrap();
}
