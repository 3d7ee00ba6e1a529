//! Quota checks for the command layer, run before it creates a record.
//! Repositories and the service never enforce these themselves.

use spacecat_core::config::LimitsConfig;

use crate::{
    error::{AutomationError, Result},
    events::EventRepository,
    reminders::ReminderRepository,
    service::EventService,
    types::Event,
};

/// Fails once the user already holds `max_reminders_per_user` in the guild.
pub fn check_reminder_limit(
    limits: &LimitsConfig,
    reminders: &ReminderRepository,
    guild_id: u64,
    user_id: u64,
) -> Result<()> {
    let count = reminders.count_by_guild_and_user(guild_id, user_id)?;
    if count >= limits.max_reminders_per_user {
        return Err(AutomationError::LimitExceeded(format!(
            "user {user_id} already has {count} reminders (max {})",
            limits.max_reminders_per_user
        )));
    }
    Ok(())
}

pub fn check_event_limit(limits: &LimitsConfig, events: &EventRepository, guild_id: u64) -> Result<()> {
    let count = events.count_by_guild(guild_id)?;
    if count >= limits.max_events_per_guild {
        return Err(AutomationError::LimitExceeded(format!(
            "guild {guild_id} already has {count} events (max {})",
            limits.max_events_per_guild
        )));
    }
    Ok(())
}

pub fn check_action_limit(limits: &LimitsConfig, service: &EventService, event: &Event) -> Result<()> {
    let count = service.action_count(event)?;
    if count >= limits.max_actions_per_event {
        return Err(AutomationError::LimitExceeded(format!(
            "event '{}' already has {count} actions (max {})",
            event.name, limits.max_actions_per_event
        )));
    }
    Ok(())
}
