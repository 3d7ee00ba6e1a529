use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{AutomationError, Result},
    schedule::calculate_next_run,
    scheduler::{backoff, sleep_until, SchedulerSettings, StaleLog, TaskSet},
    service::EventService,
    types::Event,
};

/// Holds one wait-task per due event; repeating events loop in the same task.
///
/// Cheap to clone; clones share the same scheduled set.
#[derive(Clone)]
pub struct EventScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    service: Arc<EventService>,
    settings: SchedulerSettings,
    tasks: TaskSet,
    stale: StaleLog,
}

impl EventScheduler {
    pub fn new(service: Arc<EventService>, settings: SchedulerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                settings,
                tasks: TaskSet::default(),
                stale: StaleLog::default(),
            }),
        }
    }

    pub fn service(&self) -> &Arc<EventService> {
        &self.inner.service
    }

    pub fn is_scheduled(&self, id: Uuid) -> bool {
        self.inner.tasks.contains(id)
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Start a wait-task for `event`. Returns whether a new task was started.
    ///
    /// Skipped when the event is already scheduled, paused, repeating with its
    /// next run beyond the cache window, or one-shot and either already run or
    /// overdue past the stale threshold.
    pub fn schedule(&self, event: &Event) -> bool {
        let inner = &self.inner;
        if inner.tasks.contains(event.id) {
            return false;
        }
        if event.is_paused {
            debug!(event_id = %event.id, "not scheduling paused event");
            return false;
        }

        let now = inner.service.clock().now();
        let due = calculate_next_run(event, now);
        if event.is_repeating() {
            if inner.settings.beyond_window(due, now) {
                debug!(event_id = %event.id, due, "next run beyond cache window");
                return false;
            }
        } else if event.last_run_time.is_some_and(|t| t >= event.dispatch_time) {
            debug!(event_id = %event.id, "one-time event already ran");
            return false;
        } else if inner.settings.is_stale(due, now) {
            let overdue_secs = now - due;
            if inner.stale.first_report(event.id) {
                warn!(event_id = %event.id, overdue_secs, "skipping stale one-time event");
            } else {
                debug!(event_id = %event.id, overdue_secs, "still stale");
            }
            return false;
        }

        let task_inner = Arc::clone(inner);
        let event = event.clone();
        let id = event.id;
        let spawned = inner.tasks.spawn(id, move |token, completion| async move {
            let _completion = completion;
            task_inner.run_event(event, due, token).await;
        });
        if spawned {
            debug!(event_id = %id, due, "event scheduled");
        }
        spawned
    }

    /// Schedule every stored event due within the cache window (or all of
    /// them when the window is unbounded). Returns how many were newly scheduled.
    pub fn schedule_saved(&self) -> Result<usize> {
        let inner = &self.inner;
        let events = inner.service.events();
        let now = inner.service.clock().now();
        let saved = match inner.settings.sweep_horizon(now) {
            Some(horizon) => events.get_before_timestamp(horizon)?,
            None => events.get_all()?,
        };

        let added = saved.iter().filter(|e| self.schedule(e)).count();
        info!(loaded = saved.len(), scheduled = added, "event sweep complete");
        Ok(added)
    }

    /// Cancel the wait-task for `id`. No-op if none is live.
    pub fn unschedule(&self, id: Uuid) {
        if self.inner.tasks.cancel(id) {
            debug!(event_id = %id, "event unscheduled");
        }
    }

    pub fn unschedule_all(&self) {
        let cancelled = self.inner.tasks.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "all events unscheduled");
        }
    }

    /// Replace any live wait-task after the event's timing was edited.
    pub fn reschedule(&self, event: &Event) -> bool {
        self.unschedule(event.id);
        self.schedule(event)
    }

    /// Pause a repeating event: persist the flag and drop its wait-task.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub fn pause(&self, event: &Event) -> Result<Event> {
        let mut current = self.load(event.id)?;
        if !current.is_repeating() {
            return Err(AutomationError::InvalidOperation(
                "one-time events cannot be paused".into(),
            ));
        }
        if current.is_paused {
            return Err(AutomationError::InvalidOperation(format!(
                "event '{}' is already paused",
                current.name
            )));
        }
        current.is_paused = true;
        self.inner.service.events().update(&current)?;
        self.unschedule(current.id);
        info!(name = %current.name, "event paused");
        Ok(current)
    }

    /// Resume a paused event: clear the flag and schedule it again.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub fn resume(&self, event: &Event) -> Result<Event> {
        let mut current = self.load(event.id)?;
        if !current.is_paused {
            return Err(AutomationError::InvalidOperation(format!(
                "event '{}' is not paused",
                current.name
            )));
        }
        current.is_paused = false;
        self.inner.service.events().update(&current)?;
        self.schedule(&current);
        info!(name = %current.name, "event resumed");
        Ok(current)
    }

    /// Fire `event` now, independently of its wait-task.
    pub fn trigger(&self, event: &Event) -> Result<Event> {
        self.inner.service.dispatch_event(event)
    }

    /// Sweep now and then every `sweep_interval` until `shutdown` turns `true`,
    /// then cancel every live wait-task.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("event scheduler started");
        let mut interval = tokio::time::interval(self.inner.settings.sweep_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.schedule_saved() {
                        error!("event sweep failed: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.unschedule_all();
        info!("event scheduler stopped");
    }

    fn load(&self, id: Uuid) -> Result<Event> {
        self.inner
            .service
            .events()
            .get_by_id(id)?
            .ok_or(AutomationError::NotFound { entity: "event", id })
    }
}

impl Inner {
    async fn run_event(&self, event: Event, mut due: i64, token: CancellationToken) {
        let clock = Arc::clone(self.service.clock());
        let id = event.id;
        loop {
            if !sleep_until(clock.as_ref(), due, &token).await {
                return;
            }
            // Fire the stored copy so edits made while waiting are not overwritten.
            let Some(current) = self.reload(id) else {
                return;
            };
            let Some(fired) = self.dispatch_with_retry(&current, &token).await else {
                return;
            };
            if !fired.is_repeating() {
                return;
            }

            let Some(current) = self.reload(id) else {
                return;
            };
            if current.is_paused || !current.is_repeating() {
                debug!(event_id = %id, "event no longer repeats; stopping");
                return;
            }
            let now = clock.now();
            due = calculate_next_run(&current, now);
            if self.settings.beyond_window(due, now) {
                debug!(event_id = %id, due, "next run beyond cache window; left for the sweep");
                return;
            }
            debug!(event_id = %id, due, "event rescheduled");
        }
    }

    /// Latest stored state of the event, or `None` if it is gone or paused.
    fn reload(&self, id: Uuid) -> Option<Event> {
        match self.service.events().get_by_id(id) {
            Ok(Some(event)) if !event.is_paused => Some(event),
            Ok(Some(_)) => {
                debug!(event_id = %id, "event paused while scheduled");
                None
            }
            Ok(None) => {
                debug!(event_id = %id, "event deleted while scheduled");
                None
            }
            Err(e) => {
                error!(event_id = %id, "failed to reload event: {e}");
                None
            }
        }
    }

    async fn dispatch_with_retry(&self, event: &Event, token: &CancellationToken) -> Option<Event> {
        loop {
            if token.is_cancelled() {
                return None;
            }
            match self.service.dispatch_event(event) {
                Ok(fired) => return Some(fired),
                Err(e) if e.is_transient() => {
                    warn!(
                        event_id = %event.id,
                        retry_in_secs = self.settings.retry_delay.as_secs(),
                        "event dispatch failed, retrying: {e}"
                    );
                    if !backoff(self.settings.retry_delay, token).await {
                        return None;
                    }
                }
                Err(e) => {
                    error!(event_id = %event.id, "event dispatch failed: {e}");
                    return None;
                }
            }
        }
    }
}

impl std::fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScheduler")
            .field("scheduled", &self.scheduled_count())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;
    use crate::sink::{ChannelSink, Notification};
    use crate::store::Store;
    use crate::types::Repeat;
    use spacecat_core::ManualClock;

    const DAY: i64 = 86_400;

    struct Fixture {
        scheduler: EventScheduler,
        _rx: tokio::sync::mpsc::Receiver<Notification>,
    }

    fn fixture(now: i64) -> Fixture {
        let store = Store::open_in_memory().unwrap();
        let (sink, rx) = ChannelSink::channel(8);
        let service = EventService::new(
            store.clone(),
            ActionRegistry::with_defaults(&store),
            Arc::new(sink),
            Arc::new(ManualClock::new(now)),
        );
        let scheduler = EventScheduler::new(
            Arc::new(service),
            SchedulerSettings::default()
                .with_cache_window(Some(DAY))
                .with_stale_after(Some(300)),
        );
        Fixture { scheduler, _rx: rx }
    }

    fn add(scheduler: &EventScheduler, event: &Event) {
        scheduler.service().events().add(event).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn paused_event_is_never_scheduled() {
        let f = fixture(0);
        let mut event = Event::create_new(1, 100, Repeat::Daily, 1, "p", "");
        event.is_paused = true;
        add(&f.scheduler, &event);

        assert!(!f.scheduler.schedule(&event));
        assert_eq!(f.scheduler.schedule_saved().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_is_idempotent() {
        let f = fixture(0);
        let event = Event::create_new(1, 100, Repeat::No, 1, "once", "");
        add(&f.scheduler, &event);

        assert!(f.scheduler.schedule(&event));
        assert!(!f.scheduler.schedule(&event));
        assert_eq!(f.scheduler.scheduled_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_event_beyond_window_waits_for_sweep() {
        let f = fixture(0);
        let event = Event::create_new(1, 3 * DAY, Repeat::Weekly, 1, "later", "");
        add(&f.scheduler, &event);
        assert!(!f.scheduler.schedule(&event));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_and_finished_one_time_events_are_skipped() {
        let f = fixture(10_000);
        let stale = Event::create_new(1, 10_000 - 301, Repeat::No, 1, "stale", "");
        let mut done = Event::create_new(1, 9_990, Repeat::No, 1, "done", "");
        done.last_run_time = Some(9_990);
        let fresh = Event::create_new(1, 10_000 - 299, Repeat::No, 1, "fresh", "");
        for e in [&stale, &done, &fresh] {
            add(&f.scheduler, e);
        }

        assert_eq!(f.scheduler.schedule_saved().unwrap(), 1);
        assert!(f.scheduler.is_scheduled(fresh.id));

        // Later sweeps keep skipping the stale event without touching it.
        assert_eq!(f.scheduler.schedule_saved().unwrap(), 0);
        assert!(!f.scheduler.is_scheduled(stale.id));
        assert!(!f.scheduler.inner.stale.first_report(stale.id));
        assert_eq!(
            f.scheduler.service().events().get_by_id(stale.id).unwrap(),
            Some(stale)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_rules() {
        let f = fixture(0);
        let once = Event::create_new(1, 100, Repeat::No, 1, "once", "");
        let daily = Event::create_new(1, 100, Repeat::Daily, 1, "daily", "");
        add(&f.scheduler, &once);
        add(&f.scheduler, &daily);
        f.scheduler.schedule(&daily);

        assert!(matches!(
            f.scheduler.pause(&once),
            Err(AutomationError::InvalidOperation(_))
        ));
        assert!(matches!(
            f.scheduler.resume(&daily),
            Err(AutomationError::InvalidOperation(_))
        ));

        let paused = f.scheduler.pause(&daily).unwrap();
        assert!(paused.is_paused);
        assert!(!f.scheduler.is_scheduled(daily.id));
        assert!(matches!(
            f.scheduler.pause(&daily),
            Err(AutomationError::InvalidOperation(_))
        ));

        let resumed = f.scheduler.resume(&daily).unwrap();
        assert!(!resumed.is_paused);
        assert!(f.scheduler.is_scheduled(daily.id));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_the_task() {
        let f = fixture(0);
        let event = Event::create_new(1, 100, Repeat::No, 1, "once", "");
        add(&f.scheduler, &event);
        f.scheduler.schedule(&event);
        assert!(f.scheduler.reschedule(&event));
        assert_eq!(f.scheduler.scheduled_count(), 1);
    }
}
