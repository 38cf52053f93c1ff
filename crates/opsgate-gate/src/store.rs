//! The backing store contract for dedup/backoff state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Per `(source, fingerprint)` bookkeeping returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateState {
    /// Whether the gate opened for this event.
    pub allowed: bool,
    /// Repeats observed inside the current window.
    pub count: u32,
    /// When this fingerprint was last seen.
    pub last_seen: DateTime<Utc>,
}

/// External store owning the dedup/backoff state machine.
///
/// The gate only computes fingerprints and filters severities; whether a
/// given firing opens the gate is decided here, keyed by
/// `(source, fingerprint)`.
#[async_trait]
pub trait EventGateStore: Send + Sync {
    async fn upsert(
        &self,
        source: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
        window: Duration,
        backoff: Duration,
        min_count: u32,
    ) -> anyhow::Result<GateState>;
}

#[derive(Debug, Clone)]
struct Entry {
    count: u32,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    last_allowed: Option<DateTime<Utc>>,
}

/// In-memory reference implementation of the dedup/backoff state machine.
///
/// Within a window, repeats accumulate; the gate opens once the repeat
/// count reaches `min_count`, then stays shut for the backoff interval.
/// A window with no firings resets the count.
#[derive(Debug, Default)]
pub struct MemoryGateStore {
    entries: RwLock<HashMap<(String, String), Entry>>,
}

impl MemoryGateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventGateStore for MemoryGateStore {
    async fn upsert(
        &self,
        source: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
        window: Duration,
        backoff: Duration,
        min_count: u32,
    ) -> anyhow::Result<GateState> {
        let window = chrono::Duration::from_std(window)?;
        let backoff = chrono::Duration::from_std(backoff)?;
        let key = (source.to_string(), fingerprint.to_string());

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entry = entries.entry(key).or_insert(Entry {
            count: 0,
            first_seen: now,
            last_seen: now,
            last_allowed: None,
        });

        if now - entry.first_seen > window {
            entry.count = 0;
            entry.first_seen = now;
        }
        entry.count += 1;
        entry.last_seen = now;

        let in_backoff = entry
            .last_allowed
            .is_some_and(|last| now - last < backoff);
        let allowed = !in_backoff && entry.count >= min_count;
        if allowed {
            entry.last_allowed = Some(now);
        }

        Ok(GateState {
            allowed,
            count: entry.count,
            last_seen: entry.last_seen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test]
    async fn first_firing_opens_with_min_count_one() {
        let store = MemoryGateStore::new();
        let now = Utc::now();
        let state = store
            .upsert("alertmanager", "fp", now, secs(300), secs(600), 1)
            .await
            .unwrap();
        assert!(state.allowed);
        assert_eq!(state.count, 1);
    }

    #[tokio::test]
    async fn repeats_below_threshold_stay_shut() {
        let store = MemoryGateStore::new();
        let now = Utc::now();
        let first = store
            .upsert("alertmanager", "fp", now, secs(300), secs(600), 3)
            .await
            .unwrap();
        assert!(!first.allowed);

        let second = store
            .upsert("alertmanager", "fp", now, secs(300), secs(600), 3)
            .await
            .unwrap();
        assert!(!second.allowed);

        let third = store
            .upsert("alertmanager", "fp", now, secs(300), secs(600), 3)
            .await
            .unwrap();
        assert!(third.allowed);
    }

    #[tokio::test]
    async fn backoff_suppresses_after_a_trigger() {
        let store = MemoryGateStore::new();
        let now = Utc::now();
        assert!(
            store
                .upsert("s", "fp", now, secs(300), secs(600), 1)
                .await
                .unwrap()
                .allowed
        );
        // Still inside the backoff interval.
        let again = store
            .upsert("s", "fp", now + chrono::Duration::seconds(30), secs(300), secs(600), 1)
            .await
            .unwrap();
        assert!(!again.allowed);
        // Backoff elapsed.
        let later = store
            .upsert("s", "fp", now + chrono::Duration::seconds(601), secs(300), secs(600), 1)
            .await
            .unwrap();
        assert!(later.allowed);
    }

    #[tokio::test]
    async fn stale_window_resets_the_count() {
        let store = MemoryGateStore::new();
        let now = Utc::now();
        store
            .upsert("s", "fp", now, secs(60), secs(600), 2)
            .await
            .unwrap();
        // A firing long after the window restarts accumulation.
        let state = store
            .upsert("s", "fp", now + chrono::Duration::seconds(120), secs(60), secs(600), 2)
            .await
            .unwrap();
        assert_eq!(state.count, 1);
        assert!(!state.allowed);
    }
}
