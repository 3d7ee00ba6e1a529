//! `spacecat-automation`: reminders and events for the SpaceCat bot, with
//! SQLite persistence and one Tokio wait-task per due item.
//!
//! # Overview
//!
//! Records live in SQLite behind a shared [`store::Store`]. The
//! [`reminder_scheduler::ReminderScheduler`] and
//! [`event_scheduler::EventScheduler`] keep a wait-task for every item due
//! inside the cache window and hand fired items to a
//! [`sink::NotificationSink`]. The bot layer on the other side of the sink
//! performs the actual side effects.
//!
//! # Action types
//!
//! | Type name         | Effect                                       |
//! |-------------------|----------------------------------------------|
//! | `message`         | Post a message in a text channel             |
//! | `broadcast`       | Post a titled announcement                   |
//! | `voice_kick`      | Disconnect everyone from a voice channel     |
//! | `voice_move`      | Move everyone to another voice channel       |
//! | `channel_private` | Hide a channel from everyone                 |
//! | `channel_public`  | Make a channel visible to everyone           |

pub mod actions;
pub mod db;
pub mod error;
pub mod event_actions;
pub mod event_scheduler;
pub mod events;
pub mod limits;
pub mod reminder_scheduler;
pub mod reminders;
pub mod schedule;
mod scheduler;
pub mod service;
pub mod sink;
pub mod store;
pub mod types;

pub use actions::{Action, ActionKind, ActionRegistry, ActionRepository};
pub use error::{AutomationError, Result};
pub use event_actions::EventActionRepository;
pub use event_scheduler::EventScheduler;
pub use events::EventRepository;
pub use reminder_scheduler::ReminderScheduler;
pub use reminders::ReminderRepository;
pub use schedule::calculate_next_run;
pub use scheduler::SchedulerSettings;
pub use service::{ActionChain, EventService};
pub use sink::{ChannelSink, Notification, NotificationSink, Payload, SinkError};
pub use store::Store;
pub use types::{Event, EventAction, Reminder, Repeat, SENTINEL_ID};
