//! Tests for the leader gauge
//!
//! The gauge is process-global, so these run in their own test binary.

use leader_finder::advertisement::LeaderAddress;
use leader_finder::cache::LeaderCache;
use leader_finder::metrics;
use std::time::Duration;

#[tokio::test]
async fn test_stale_entry_clears_leader_known() {
    metrics::init_metrics().unwrap();
    let cache = LeaderCache::new(Some(Duration::from_millis(20)));

    cache.write(LeaderAddress::new("10.0.0.1", 8081)).await;
    assert_eq!(metrics::leader_known(), Some(true));
    assert!(cache.leader_url().await.is_ok());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.leader_url().await.is_err());
    assert_eq!(metrics::leader_known(), Some(false));

    let text = metrics::encode_metrics().unwrap();
    assert!(text.contains("leader_finder_leader_known 0"));

    // Re-confirming the same leader sets it again
    cache.write(LeaderAddress::new("10.0.0.1", 8081)).await;
    assert_eq!(metrics::leader_known(), Some(true));
    assert!(cache.leader_url().await.is_ok());
}
