//! Plumbing shared by the reminder and event schedulers: the in-memory set of
//! live wait-tasks, the cancellable sleep, and scheduler settings.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use spacecat_core::{config::AutomationConfig, Clock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Tuning shared by both schedulers, usually built from [`AutomationConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Look-ahead horizon in seconds; `None` holds everything in memory.
    pub cache_window: Option<i64>,
    /// One-shot items overdue by more than this are dropped; `None` fires them late.
    pub stale_after: Option<i64>,
    pub retry_delay: Duration,
    pub sweep_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&AutomationConfig::default())
    }
}

impl From<&AutomationConfig> for SchedulerSettings {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            cache_window: config.cache_window(),
            stale_after: config.stale_after(),
            retry_delay: config.retry_delay(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

impl SchedulerSettings {
    pub fn with_cache_window(mut self, window: Option<i64>) -> Self {
        self.cache_window = window;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Option<i64>) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// True when a one-shot item due at `due` is too late to fire at `now`.
    pub(crate) fn is_stale(&self, due: i64, now: i64) -> bool {
        self.stale_after.is_some_and(|limit| now - due > limit)
    }

    /// True when `due` lies beyond the cache window as seen from `now`.
    pub(crate) fn beyond_window(&self, due: i64, now: i64) -> bool {
        self.cache_window.is_some_and(|window| due - now > window)
    }

    /// Exclusive upper bound for a sweep, or `None` to load everything.
    pub(crate) fn sweep_horizon(&self, now: i64) -> Option<i64> {
        self.cache_window.map(|window| now.saturating_add(window))
    }
}

/// Ids already reported as stale, so each is logged at `warn` only once
/// however many sweeps skip it.
#[derive(Default)]
pub(crate) struct StaleLog {
    reported: Mutex<HashSet<Uuid>>,
}

impl StaleLog {
    /// Record `id`; true the first time it is seen.
    pub(crate) fn first_report(&self, id: Uuid) -> bool {
        self.reported
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id)
    }
}

struct Entry {
    token: CancellationToken,
    generation: u64,
    // Held so the task is owned by the set; cancellation goes through `token`.
    _handle: JoinHandle<()>,
}

/// The scheduled set: item id → live wait-task.
///
/// Only reachable through the owning scheduler's methods. Each task removes
/// its own entry when it ends, matched by generation so a task that finishes
/// after being replaced never evicts its successor.
#[derive(Clone, Default)]
pub(crate) struct TaskSet {
    entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
    generations: Arc<AtomicU64>,
}

impl TaskSet {
    pub(crate) fn contains(&self, id: Uuid) -> bool {
        self.lock().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Spawn `make(token, completion)` for `id` unless a task already exists.
    /// Returns whether a task was spawned.
    pub(crate) fn spawn<F, Fut>(&self, id: Uuid, make: F) -> bool
    where
        F: FnOnce(CancellationToken, Completion) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return false;
        }
        let token = CancellationToken::new();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let completion = Completion {
            set: self.clone(),
            id,
            generation,
        };
        let handle = tokio::spawn(make(token.clone(), completion));
        entries.insert(
            id,
            Entry {
                token,
                generation,
                _handle: handle,
            },
        );
        true
    }

    /// Cancel and forget the task for `id`. Returns whether one existed.
    pub(crate) fn cancel(&self, id: Uuid) -> bool {
        match self.lock().remove(&id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.token.cancel();
        }
        drained.len()
    }

    fn finish(&self, id: Uuid, generation: u64) {
        let mut entries = self.lock();
        if entries.get(&id).is_some_and(|e| e.generation == generation) {
            entries.remove(&id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes the task's entry from its [`TaskSet`] when dropped, panics included.
pub(crate) struct Completion {
    set: TaskSet,
    id: Uuid,
    generation: u64,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.set.finish(self.id, self.generation);
    }
}

/// Longest single sleep inside [`sleep_until`]; bounds how late a forward
/// clock jump is noticed.
const MAX_SLEEP_SECS: u64 = 60;

/// Sleep until `clock` reads at least `due`.
///
/// The remaining time is recomputed after every wake-up (at least once per
/// [`MAX_SLEEP_SECS`]), so early wake-ups and clock resets in either
/// direction only cost another iteration. Returns `false` if `token` was
/// cancelled first.
pub(crate) async fn sleep_until(clock: &dyn Clock, due: i64, token: &CancellationToken) -> bool {
    loop {
        if token.is_cancelled() {
            return false;
        }
        let remaining = due - clock.now();
        if remaining <= 0 {
            return true;
        }
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(Duration::from_secs((remaining as u64).min(MAX_SLEEP_SECS))) => {}
        }
    }
}

/// Cancellable pause between retries. Returns `false` if cancelled.
pub(crate) async fn backoff(delay: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacecat_core::ManualClock;

    #[tokio::test(start_paused = true)]
    async fn spawn_is_idempotent_and_entries_clear_on_exit() {
        let set = TaskSet::default();
        let id = Uuid::new_v4();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        assert!(set.spawn(id, |_token, completion| async move {
            let _completion = completion;
            let _ = rx.await;
        }));
        assert!(!set.spawn(id, |_, _| async {}));
        assert!(set.contains(id));

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!set.contains(id));
        assert_eq!(set.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sleep_returns_false() {
        let clock = ManualClock::new(0);
        let token = CancellationToken::new();
        let sleeper = {
            let token = token.clone();
            tokio::spawn(async move { sleep_until(&clock, 3_600, &token).await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
        assert!(!sleeper.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn forward_clock_jump_wakes_within_a_minute() {
        let clock = Arc::new(ManualClock::new(0));
        let token = CancellationToken::new();
        let sleeper = {
            let clock = clock.clone();
            let token = token.clone();
            tokio::spawn(async move { sleep_until(clock.as_ref(), 86_400, &token).await })
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!sleeper.is_finished());

        clock.set(86_400);
        tokio::time::sleep(Duration::from_secs(MAX_SLEEP_SECS + 1)).await;
        assert!(sleeper.is_finished());
        assert!(sleeper.await.unwrap());
    }

    #[tokio::test]
    async fn past_due_returns_immediately() {
        let clock = ManualClock::new(100);
        assert!(sleep_until(&clock, 50, &CancellationToken::new()).await);
    }

    #[test]
    fn stale_ids_are_reported_once() {
        let log = StaleLog::default();
        let id = Uuid::new_v4();
        assert!(log.first_report(id));
        assert!(!log.first_report(id));
        assert!(log.first_report(Uuid::new_v4()));
    }

    #[test]
    fn settings_windows() {
        let settings = SchedulerSettings::default()
            .with_cache_window(Some(100))
            .with_stale_after(Some(300));
        assert!(settings.beyond_window(201, 100));
        assert!(!settings.beyond_window(200, 100));
        assert!(settings.is_stale(0, 301));
        assert!(!settings.is_stale(0, 300));
        assert_eq!(settings.sweep_horizon(10), Some(110));

        let unbounded = settings.with_cache_window(None).with_stale_after(None);
        assert!(!unbounded.beyond_window(i64::MAX, 0));
        assert!(!unbounded.is_stale(0, i64::MAX));
        assert_eq!(unbounded.sweep_horizon(10), None);
    }
}
