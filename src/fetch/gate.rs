//! Per-host request gate
//!
//! Every request to a host first takes that host's lock, waits out the
//! remaining delay, then records itself. Concurrent workers sharing a host
//! are therefore serialized at the configured rate.

use crate::state::HostState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct HostGate {
    hosts: Mutex<HashMap<String, Arc<AsyncMutex<HostState>>>>,
}

impl HostGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, host: &str) -> Arc<AsyncMutex<HostState>> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.entry(host.to_string()).or_default().clone()
    }

    /// Waits for the host's turn and returns its slot
    ///
    /// The slot stays locked until the guard is dropped.
    pub async fn acquire(&self, host: &str, min_delay: Duration) -> OwnedMutexGuard<HostState> {
        let mut state = self.entry(host).lock_owned().await;

        if let Some(wait) = state.time_until_next_request(min_delay, Instant::now()) {
            tracing::debug!(host = %host, wait_ms = wait.as_millis() as u64, "Waiting for host gate");
            tokio::time::sleep(wait).await;
        }

        state.record_request(Instant::now());
        state
    }

    /// Applies a robots.txt crawl-delay to the host
    pub async fn set_robots_delay(&self, host: &str, delay: Option<Duration>) {
        self.entry(host).lock().await.robots_delay = delay;
    }

    /// Requests sent to the host so far
    pub async fn request_count(&self, host: &str) -> u64 {
        self.entry(host).lock().await.request_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_request_waits_for_delay() {
        let gate = HostGate::new();
        let delay = Duration::from_millis(150);

        let start = Instant::now();
        drop(gate.acquire("example.com", delay).await);
        drop(gate.acquire("example.com", delay).await);

        assert!(start.elapsed() >= delay);
        assert_eq!(gate.request_count("example.com").await, 2);
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let gate = HostGate::new();
        let delay = Duration::from_secs(5);

        let start = Instant::now();
        drop(gate.acquire("a.example.com", delay).await);
        drop(gate.acquire("b.example.com", delay).await);

        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_concurrent_workers_are_serialized() {
        let gate = Arc::new(HostGate::new());
        let delay = Duration::from_millis(100);
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                drop(gate.acquire("example.com", delay).await);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Three requests need two full gaps
        assert!(start.elapsed() >= delay * 2);
    }

    #[tokio::test]
    async fn test_robots_delay_applies() {
        let gate = HostGate::new();
        gate.set_robots_delay("slow.example.com", Some(Duration::from_millis(200)))
            .await;

        let start = Instant::now();
        drop(gate.acquire("slow.example.com", Duration::from_millis(10)).await);
        drop(gate.acquire("slow.example.com", Duration::from_millis(10)).await);

        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
