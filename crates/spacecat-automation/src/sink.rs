use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{actions::Action, types::Reminder};

/// Notification kind emitted when a reminder comes due.
pub const REMINDER_KIND: &str = "reminder";

/// What fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Reminder(Reminder),
    Action(Action),
}

/// A named event handed to the bot layer, which turns it into a side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// `"reminder"` or `"<action type>_action"`.
    pub kind: String,
    pub payload: Payload,
}

impl Notification {
    pub fn reminder(reminder: Reminder) -> Self {
        Self {
            kind: REMINDER_KIND.to_string(),
            payload: Payload::Reminder(reminder),
        }
    }

    pub fn action(action: Action) -> Self {
        Self {
            kind: action.kind().dispatch_kind(),
            payload: Payload::Action(action),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("notification channel full")]
    Full,
    #[error("notification receiver dropped")]
    Closed,
}

/// Receives every dispatch from the schedulers.
///
/// Implementations must return promptly: each call runs on the wait-task of
/// the item being dispatched.
pub trait NotificationSink: Send + Sync {
    fn dispatch(&self, notification: Notification) -> Result<(), SinkError>;
}

/// Forwards notifications over a bounded mpsc channel.
///
/// Uses `try_send`, so a slow consumer surfaces as [`SinkError::Full`] (retried
/// by the scheduler) instead of stalling the wait-task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Notification>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiver the bot layer drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

impl NotificationSink for ChannelSink {
    fn dispatch(&self, notification: Notification) -> Result<(), SinkError> {
        self.tx.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
