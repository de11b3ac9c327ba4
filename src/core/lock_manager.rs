use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub struct LockEntry {
    pub task_id: String,
    pub topic_name: String,
    pub expires_at: DateTime<Utc>,
}

impl LockEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Tasks this worker currently holds a lock on.
#[derive(Debug, Default)]
pub struct LockManager {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, LockEntry>> {
        // 中毒的鎖仍然持有一致的 map，直接取回
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a lock. Returns `false` when the task is already held and
    /// the existing lock has not expired yet.
    pub fn acquire(&self, task_id: &str, topic_name: &str, expires_at: DateTime<Utc>) -> bool {
        let now = Utc::now();
        let mut entries = self.entries();

        if let Some(existing) = entries.get(task_id) {
            if !existing.is_expired_at(now) {
                tracing::debug!(
                    "Task {} already locked until {}, skipping",
                    task_id,
                    existing.expires_at
                );
                return false;
            }
        }

        entries.insert(
            task_id.to_string(),
            LockEntry {
                task_id: task_id.to_string(),
                topic_name: topic_name.to_string(),
                expires_at,
            },
        );
        true
    }

    pub fn release(&self, task_id: &str) -> Option<LockEntry> {
        self.entries().remove(task_id)
    }

    /// Moves the expiry of a held lock to `now + new_duration_ms`.
    pub fn extend(&self, task_id: &str, new_duration_ms: u64) -> Option<DateTime<Utc>> {
        let mut entries = self.entries();
        let entry = entries.get_mut(task_id)?;
        entry.expires_at = Utc::now() + millis(new_duration_ms);
        Some(entry.expires_at)
    }

    pub fn is_locked(&self, task_id: &str) -> bool {
        self.entries()
            .get(task_id)
            .map(|entry| !entry.is_expired_at(Utc::now()))
            .unwrap_or(false)
    }

    pub fn get(&self, task_id: &str) -> Option<LockEntry> {
        self.entries().get(task_id).cloned()
    }

    /// Removes expired locks and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!("Purged {} expired task locks", purged);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Lock durations are capped at ten years.
const MAX_LOCK_MILLIS: u64 = 10 * 365 * 24 * 60 * 60 * 1000;

pub(crate) fn millis(ms: u64) -> ChronoDuration {
    ChronoDuration::milliseconds(ms.min(MAX_LOCK_MILLIS) as i64)
}
