//! Common test utilities

use std::time::Duration;

use leader_finder::config::FinderConfig;
use leader_finder::coordination::MemoryEnsemble;
use leader_finder::finder::Finder;

pub const ELECTION_PATH: &str = "/aurora/scheduler";

/// Advertisement payload for `host:port`
pub fn payload(host: &str, port: u16) -> String {
    serde_json::json!({
        "serviceEndpoint": {"host": host, "port": port},
        "additionalEndpoints": {"http": {"host": host, "port": port}},
        "status": "ALIVE",
    })
    .to_string()
}

/// Ensemble with the election directory already created
pub fn ensemble() -> MemoryEnsemble {
    let ensemble = MemoryEnsemble::new();
    ensemble.create_path(ELECTION_PATH);
    ensemble
}

/// Register a member advertising `host:port` and return its node path
pub fn join(ensemble: &MemoryEnsemble, host: &str, port: u16) -> String {
    ensemble
        .create_sequential(ELECTION_PATH, "member_", payload(host, port))
        .unwrap()
}

/// Watch-mode config that refreshes quickly
pub fn fast_config() -> FinderConfig {
    FinderConfig::builder()
        .address("zk://zk1:2181,zk2:2181")
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap()
}

/// Poll the finder until it reports `expected`
pub async fn wait_for_url(finder: &Finder, expected: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let current = finder.leader_url().await;
        if matches!(&current, Ok(url) if url == expected) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("leader never became {expected}, last answer: {current:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Let the watcher run a few more cycles
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
