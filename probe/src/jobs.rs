//! Measurement Job table (spec §3 "Measurement Job (in-memory)", §4.J
//! sweep): tracks in-flight `measurementId -> startedAt` so a stale-job
//! sweep can garbage-collect jobs whose completion was never observed.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const STALE_AFTER: Duration = Duration::from_secs(30);
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Default)]
pub struct JobTable {
    inner: RwLock<HashMap<String, Instant>>,
}

impl JobTable {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    pub async fn insert(&self, measurement_id: String) {
        self.inner.write().await.insert(measurement_id, Instant::now());
    }

    pub async fn remove(&self, measurement_id: &str) {
        self.inner.write().await.remove(measurement_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    async fn sweep(&self) {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        guard.retain(|_, started_at| now.duration_since(*started_at) < STALE_AFTER);
    }

    /// Runs the 10s stale-job sweep ticker forever. Intended to be spawned
    /// as its own task for the lifetime of the connection supervisor.
    pub async fn run_sweep(self: std::sync::Arc<Self>) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_removes_only_stale_entries() {
        let table = JobTable::default();
        table.inner.write().await.insert(
            "old".to_string(),
            Instant::now() - Duration::from_secs(31),
        );
        table.insert("fresh".to_string()).await;
        table.sweep().await;
        let guard = table.inner.read().await;
        assert!(!guard.contains_key("old"));
        assert!(guard.contains_key("fresh"));
    }
}
