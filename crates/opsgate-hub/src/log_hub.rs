//! Execution-keyed log line hub with bounded per-key history.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default per-subscriber channel capacity.
const DEFAULT_CAPACITY: usize = 8;
/// Default number of log lines retained per execution.
const DEFAULT_HISTORY_LIMIT: usize = 200;
/// Default cap on distinct execution keys before eviction.
const DEFAULT_MAX_KEYS: usize = 500;

struct LogInner {
    next_id: u64,
    subscribers: HashMap<String, Vec<(u64, mpsc::Sender<String>)>>,
    history: HashMap<String, VecDeque<String>>,
}

/// Concurrent pub/sub bus for execution log lines, keyed by execution ID.
///
/// Identical subscribe/publish/cancel semantics to the event hub, plus a
/// bounded history buffer per key so a new subscriber can be handed recent
/// context before live-tailing. When the number of distinct keys exceeds
/// the cap, keys with no active subscriber are evicted first.
pub struct LogHub {
    inner: Arc<Mutex<LogInner>>,
    capacity: usize,
    history_limit: usize,
    max_keys: usize,
}

impl LogHub {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_KEYS)
    }

    /// Create a hub with custom channel capacity, per-key history limit,
    /// and key cap.
    pub fn with_limits(capacity: usize, history_limit: usize, max_keys: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                next_id: 0,
                subscribers: HashMap::new(),
                history: HashMap::new(),
            })),
            capacity: capacity.max(1),
            history_limit: history_limit.max(1),
            max_keys: max_keys.max(1),
        }
    }

    /// Subscribe to log lines for an execution.
    pub fn subscribe(&self, execution_id: &str) -> (mpsc::Receiver<String>, LogSubscription) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .subscribers
            .entry(execution_id.to_string())
            .or_default()
            .push((id, tx));
        tracing::debug!(execution = %execution_id, subscriber = id, "log subscriber added");
        (
            rx,
            LogSubscription {
                inner: Arc::clone(&self.inner),
                execution_id: execution_id.to_string(),
                id,
            },
        )
    }

    /// Append a log line: record it in the key's history and fan it out to
    /// live subscribers. Never blocks; full subscribers lose the line.
    pub fn append(&self, execution_id: &str, line: impl Into<String>) {
        let line = line.into();
        let mut inner = lock(&self.inner);

        let buffer = inner
            .history
            .entry(execution_id.to_string())
            .or_default();
        buffer.push_back(line.clone());
        while buffer.len() > self.history_limit {
            buffer.pop_front();
        }

        self.evict_idle_keys(&mut inner, execution_id);

        if let Some(entries) = inner.subscribers.get_mut(execution_id) {
            entries.retain(|(id, tx)| match tx.try_send(line.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(
                        execution = %execution_id,
                        subscriber = id,
                        "subscriber full; log line dropped"
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
            if entries.is_empty() {
                inner.subscribers.remove(execution_id);
            }
        }
    }

    /// The retained lines for an execution, oldest first.
    pub fn history(&self, execution_id: &str) -> Vec<String> {
        let inner = lock(&self.inner);
        inner
            .history
            .get(execution_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct executions with retained history.
    pub fn key_count(&self) -> usize {
        lock(&self.inner).history.len()
    }

    /// Drop history for keys without subscribers until under the cap.
    /// Never evicts the key currently being appended to.
    fn evict_idle_keys(&self, inner: &mut LogInner, current_key: &str) {
        if inner.history.len() <= self.max_keys {
            return;
        }
        let victims: Vec<String> = inner
            .history
            .keys()
            .filter(|key| {
                key.as_str() != current_key
                    && inner.subscribers.get(*key).is_none_or(Vec::is_empty)
            })
            .take(inner.history.len() - self.max_keys)
            .cloned()
            .collect();
        for key in victims {
            tracing::debug!(execution = %key, "evicting idle log history");
            inner.history.remove(&key);
        }
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation handle for a [`LogHub`] subscription.
pub struct LogSubscription {
    inner: Arc<Mutex<LogInner>>,
    execution_id: String,
    id: u64,
}

impl LogSubscription {
    /// Remove the subscription and close its channel. Idempotent.
    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        if let Some(entries) = inner.subscribers.get_mut(&self.execution_id) {
            entries.retain(|(entry_id, _)| *entry_id != self.id);
            if entries.is_empty() {
                inner.subscribers.remove(&self.execution_id);
            }
        }
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(inner: &Arc<Mutex<LogInner>>) -> std::sync::MutexGuard<'_, LogInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
