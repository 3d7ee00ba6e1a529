#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spacecat_automation::{
    ActionRegistry, EventService, Notification, NotificationSink, SchedulerSettings, SinkError,
    Store,
};
use spacecat_core::Clock;
use tokio::time::Instant;

/// Wall clock driven by Tokio's timer, so paused-time tests advance it
/// together with every `sleep`. `shift` simulates a wall-clock reset.
pub struct TokioClock {
    base: i64,
    offset: AtomicI64,
    start: Instant,
}

impl TokioClock {
    pub fn new(base: i64) -> Arc<Self> {
        Arc::new(Self {
            base,
            offset: AtomicI64::new(0),
            start: Instant::now(),
        })
    }

    pub fn shift(&self, secs: i64) {
        self.offset.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for TokioClock {
    fn now(&self) -> i64 {
        self.base + self.offset.load(Ordering::SeqCst) + self.start.elapsed().as_secs() as i64
    }
}

/// Records every notification; the first `failures` calls fail with `Full`.
#[derive(Default)]
pub struct RecordingSink {
    failures: AtomicUsize,
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.seen().into_iter().map(|n| n.kind).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn dispatch(&self, notification: Notification) -> Result<(), SinkError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::Full);
        }
        self.seen.lock().unwrap().push(notification);
        Ok(())
    }
}

pub fn settings() -> SchedulerSettings {
    SchedulerSettings::default()
        .with_cache_window(Some(90_000))
        .with_stale_after(Some(300))
        .with_retry_delay(Duration::from_secs(5))
}

pub fn service(store: &Store, sink: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>) -> EventService {
    EventService::new(store.clone(), ActionRegistry::with_defaults(store), sink, clock)
}

/// Let spawned wait-tasks run for `secs` of (paused) time.
pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
