//! In-memory sliding-window quota.
//!
//! Single-process only; counts reset on restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::QuotaGuard;

const HOUR: Duration = Duration::from_secs(60 * 60);

/// Allows at most `limit` attempts per identity within a sliding window.
#[derive(Debug, Clone)]
pub struct InMemoryQuota {
    limit: u32,
    window: Duration,
    attempts: Arc<RwLock<HashMap<String, VecDeque<Instant>>>>,
}

impl InMemoryQuota {
    /// Quota of `limit_per_hour` attempts per rolling hour.
    pub fn new(limit_per_hour: u32) -> Self {
        Self::with_window(limit_per_hour, HOUR)
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            attempts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.attempts.read().await.len()
    }

    /// Attempts left for `identity` in the current window.
    pub async fn remaining(&self, identity: &str) -> u32 {
        let attempts = self.attempts.read().await;
        let now = Instant::now();
        let used = attempts
            .get(identity)
            .map(|times| {
                times
                    .iter()
                    .filter(|t| now.duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0) as u32;
        self.limit.saturating_sub(used)
    }
}

#[async_trait]
impl QuotaGuard for InMemoryQuota {
    async fn allow(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.write().await;

        // Identities whose window has emptied are dropped.
        attempts.retain(|_, times| {
            while times
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.window)
            {
                times.pop_front();
            }
            !times.is_empty()
        });

        let used = attempts.get(identity).map_or(0, VecDeque::len);
        if used as u32 >= self.limit {
            debug!("Quota exhausted for {} ({} in window)", identity, used);
            return false;
        }
        attempts
            .entry(identity.to_string())
            .or_default()
            .push_back(now);
        true
    }
}
