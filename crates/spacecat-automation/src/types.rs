use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marks "no predecessor": the head of every action chain points here.
pub const SENTINEL_ID: Uuid = Uuid::nil();

/// How often an event repeats. The discriminant is the interval in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Repeat {
    No = 0,
    Hourly = 3_600,
    Daily = 86_400,
    Weekly = 604_800,
}

impl Repeat {
    pub fn seconds(self) -> i64 {
        self as i64
    }

    pub fn is_repeating(self) -> bool {
        self != Repeat::No
    }

    /// Name stored in the `events.repeat_interval` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Repeat::No => "No",
            Repeat::Hourly => "Hourly",
            Repeat::Daily => "Daily",
            Repeat::Weekly => "Weekly",
        }
    }
}

impl std::fmt::Display for Repeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Repeat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "No" => Ok(Repeat::No),
            "Hourly" => Ok(Repeat::Hourly),
            "Daily" => Ok(Repeat::Daily),
            "Weekly" => Ok(Repeat::Weekly),
            other => Err(format!("unknown repeat interval: {other}")),
        }
    }
}

/// A one-shot message a user asked to receive later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: u64,
    pub guild_id: u64,
    /// Channel the reminder was requested in.
    pub channel_id: u64,
    /// Confirmation message, so the reminder can link back to it.
    pub message_id: u64,
    pub creation_time: i64,
    pub dispatch_time: i64,
    pub message: String,
}

impl Reminder {
    #[allow(clippy::too_many_arguments)]
    pub fn create_new(
        user_id: u64,
        guild_id: u64,
        channel_id: u64,
        message_id: u64,
        creation_time: i64,
        dispatch_time: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            guild_id,
            channel_id,
            message_id,
            creation_time,
            dispatch_time,
            message: message.into(),
        }
    }
}

/// A guild-scoped trigger that fires an ordered chain of actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub guild_id: u64,
    /// First run for one-shot events; the anchor every repeat is measured
    /// from for repeating ones.
    pub dispatch_time: i64,
    pub last_run_time: Option<i64>,
    pub repeat_interval: Repeat,
    /// Multiplies `repeat_interval`. Ignored when the event does not repeat.
    pub repeat_multiplier: u32,
    /// Unique within the guild.
    pub name: String,
    pub description: String,
    pub is_paused: bool,
}

impl Event {
    pub fn create_new(
        guild_id: u64,
        dispatch_time: i64,
        repeat_interval: Repeat,
        repeat_multiplier: u32,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            guild_id,
            dispatch_time,
            last_run_time: None,
            repeat_interval,
            repeat_multiplier: repeat_multiplier.max(1),
            name: name.into(),
            description: description.into(),
            is_paused: false,
        }
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat_interval.is_repeating()
    }

    /// Seconds between runs, or `None` for a one-shot event.
    pub fn interval_secs(&self) -> Option<i64> {
        self.is_repeating()
            .then(|| self.repeat_interval.seconds() * i64::from(self.repeat_multiplier.max(1)))
    }
}

/// One link in an event's action chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAction {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Type name of the linked action, used to find its repository.
    pub action_type: String,
    pub action_id: Uuid,
    /// The link this one follows, or [`SENTINEL_ID`] for the head.
    pub previous_id: Uuid,
}

impl EventAction {
    pub fn create_new(
        event_id: Uuid,
        action_type: impl Into<String>,
        action_id: Uuid,
        previous_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            action_type: action_type.into(),
            action_id,
            previous_id,
        }
    }

    pub fn is_head(&self) -> bool {
        self.previous_id == SENTINEL_ID
    }
}

// --- row helpers shared by the repositories ----------------------------------

/// Platform snowflakes are u64 but SQLite INTEGER is i64; the cast keeps the bits.
pub(crate) fn to_sql_id(id: u64) -> i64 {
    id as i64
}

pub(crate) fn from_sql_id(raw: i64) -> u64 {
    raw as u64
}

/// Read a TEXT column as a UUID, surfacing bad data as a conversion error.
pub(crate) fn uuid_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
