use std::sync::Arc;

use spacecat_core::Clock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::{AutomationError, Result},
    reminders::ReminderRepository,
    scheduler::{backoff, sleep_until, SchedulerSettings, StaleLog, TaskSet},
    sink::{Notification, NotificationSink},
    types::Reminder,
};

/// Holds one wait-task per due reminder and fires it at its dispatch time.
///
/// Cheap to clone; clones share the same scheduled set.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    reminders: ReminderRepository,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    tasks: TaskSet,
    stale: StaleLog,
}

impl ReminderScheduler {
    pub fn new(
        reminders: ReminderRepository,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                reminders,
                sink,
                clock,
                settings,
                tasks: TaskSet::default(),
                stale: StaleLog::default(),
            }),
        }
    }

    pub fn is_scheduled(&self, id: Uuid) -> bool {
        self.inner.tasks.contains(id)
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Start a wait-task for `reminder`. Returns whether a new task was started.
    ///
    /// No-op if it is already scheduled. A reminder overdue by more than the
    /// stale threshold is skipped; its record stays until the user cancels it.
    pub fn schedule(&self, reminder: &Reminder) -> bool {
        let inner = &self.inner;
        if inner.tasks.contains(reminder.id) {
            return false;
        }
        let now = inner.clock.now();
        if inner.settings.is_stale(reminder.dispatch_time, now) {
            let overdue_secs = now - reminder.dispatch_time;
            if inner.stale.first_report(reminder.id) {
                warn!(reminder_id = %reminder.id, overdue_secs, "skipping stale reminder");
            } else {
                debug!(reminder_id = %reminder.id, overdue_secs, "still stale");
            }
            return false;
        }

        let task_inner = Arc::clone(inner);
        let reminder = reminder.clone();
        let id = reminder.id;
        let spawned = inner.tasks.spawn(id, move |token, completion| async move {
            let _completion = completion;
            task_inner.wait_and_dispatch(reminder, token).await;
        });
        if spawned {
            debug!(reminder_id = %id, "reminder scheduled");
        }
        spawned
    }

    /// Schedule every stored reminder due within the cache window (or all of
    /// them when the window is unbounded). Returns how many were newly scheduled.
    pub fn schedule_saved(&self) -> Result<usize> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let due = match inner.settings.sweep_horizon(now) {
            Some(horizon) => inner.reminders.get_before_timestamp(horizon)?,
            None => inner.reminders.get_all()?,
        };

        let added = due.iter().filter(|r| self.schedule(r)).count();
        info!(loaded = due.len(), scheduled = added, "reminder sweep complete");
        Ok(added)
    }

    /// Cancel the wait-task for `id`. No-op if none is live.
    pub fn unschedule(&self, id: Uuid) {
        if self.inner.tasks.cancel(id) {
            debug!(reminder_id = %id, "reminder unscheduled");
        }
    }

    pub fn unschedule_all(&self) {
        let cancelled = self.inner.tasks.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "all reminders unscheduled");
        }
    }

    /// Sweep now and then every `sweep_interval` until `shutdown` turns `true`,
    /// then cancel every live wait-task.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("reminder scheduler started");
        let mut interval = tokio::time::interval(self.inner.settings.sweep_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.schedule_saved() {
                        error!("reminder sweep failed: {e}");
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
        info!("reminder scheduler stopped");
    }
}

impl Inner {
    async fn wait_and_dispatch(&self, reminder: Reminder, token: CancellationToken) {
        if !sleep_until(self.clock.as_ref(), reminder.dispatch_time, &token).await {
            return;
        }
        loop {
            if token.is_cancelled() {
                return;
            }
            match self.dispatch(&reminder) {
                Ok(()) => return,
                Err(e) if e.is_transient() => {
                    warn!(
                        reminder_id = %reminder.id,
                        retry_in_secs = self.settings.retry_delay.as_secs(),
                        "reminder dispatch failed, retrying: {e}"
                    );
                    if !backoff(self.settings.retry_delay, &token).await {
                        return;
                    }
                }
                Err(e) => {
                    error!(reminder_id = %reminder.id, "reminder dispatch failed: {e}");
                    return;
                }
            }
        }
    }

    /// Emit the reminder, then delete its record.
    fn dispatch(&self, reminder: &Reminder) -> Result<()> {
        self.sink.dispatch(Notification::reminder(reminder.clone()))?;
        match self.reminders.remove(reminder.id) {
            Ok(()) | Err(AutomationError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        info!(reminder_id = %reminder.id, user_id = reminder.user_id, "reminder dispatched");
        Ok(())
    }
}

impl std::fmt::Debug for ReminderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderScheduler")
            .field("scheduled", &self.scheduled_count())
            .field("settings", &self.inner.settings)
            .finish()
    }
}
