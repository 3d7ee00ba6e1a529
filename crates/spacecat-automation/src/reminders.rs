use rusqlite::{params, OptionalExtension};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    error::{AutomationError, Result},
    store::{collect_rows, Store},
    types::{from_sql_id, to_sql_id, uuid_column, Reminder},
};

const COLUMNS: &str = "id, user_id, guild_id, channel_id, message_id, creation_time, dispatch_time, message";

/// CRUD over the `reminders` table.
#[derive(Debug, Clone)]
pub struct ReminderRepository {
    store: Store,
}

impl ReminderRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    pub fn add(&self, reminder: &Reminder) -> Result<()> {
        self.store.with(|conn| {
            conn.execute(
                "INSERT INTO reminders (id, user_id, guild_id, channel_id, message_id,
                                        creation_time, dispatch_time, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    reminder.id.to_string(),
                    to_sql_id(reminder.user_id),
                    to_sql_id(reminder.guild_id),
                    to_sql_id(reminder.channel_id),
                    to_sql_id(reminder.message_id),
                    reminder.creation_time,
                    reminder.dispatch_time,
                    reminder.message,
                ],
            )
            .map_err(|e| AutomationError::from_insert(e, "reminder", reminder.id.to_string()))?;
            debug!("reminder added");
            Ok(())
        })
    }

    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    pub fn update(&self, reminder: &Reminder) -> Result<()> {
        let changed = self.store.with(|conn| {
            Ok(conn.execute(
                "UPDATE reminders
                 SET user_id = ?2, guild_id = ?3, channel_id = ?4, message_id = ?5,
                     creation_time = ?6, dispatch_time = ?7, message = ?8
                 WHERE id = ?1",
                params![
                    reminder.id.to_string(),
                    to_sql_id(reminder.user_id),
                    to_sql_id(reminder.guild_id),
                    to_sql_id(reminder.channel_id),
                    to_sql_id(reminder.message_id),
                    reminder.creation_time,
                    reminder.dispatch_time,
                    reminder.message,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(AutomationError::NotFound {
                entity: "reminder",
                id: reminder.id,
            });
        }
        Ok(())
    }

    /// Delete a reminder. Returns `NotFound` if no row was deleted.
    #[instrument(skip(self))]
    pub fn remove(&self, id: Uuid) -> Result<()> {
        let changed = self.store.with(|conn| {
            Ok(conn.execute("DELETE FROM reminders WHERE id = ?1", [id.to_string()])?)
        })?;
        if changed == 0 {
            return Err(AutomationError::NotFound {
                entity: "reminder",
                id,
            });
        }
        debug!("reminder removed");
        Ok(())
    }

    pub fn get_by_id(&self, id: Uuid) -> Result<Option<Reminder>> {
        self.store.with(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM reminders WHERE id = ?1"),
                    [id.to_string()],
                    row_to_reminder,
                )
                .optional()?)
        })
    }

    pub fn get_by_guild(&self, guild_id: u64) -> Result<Vec<Reminder>> {
        self.query(
            &format!("SELECT {COLUMNS} FROM reminders WHERE guild_id = ?1 ORDER BY dispatch_time"),
            params![to_sql_id(guild_id)],
        )
    }

    /// A user's reminders in one guild, soonest first.
    pub fn get_by_guild_and_user(&self, guild_id: u64, user_id: u64) -> Result<Vec<Reminder>> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM reminders
                 WHERE guild_id = ?1 AND user_id = ?2
                 ORDER BY dispatch_time"
            ),
            params![to_sql_id(guild_id), to_sql_id(user_id)],
        )
    }

    pub fn count_by_guild_and_user(&self, guild_id: u64, user_id: u64) -> Result<usize> {
        self.store.with(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reminders WHERE guild_id = ?1 AND user_id = ?2",
                params![to_sql_id(guild_id), to_sql_id(user_id)],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// Reminders due strictly before `timestamp`, soonest first.
    pub fn get_before_timestamp(&self, timestamp: i64) -> Result<Vec<Reminder>> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM reminders WHERE dispatch_time < ?1 ORDER BY dispatch_time"
            ),
            params![timestamp],
        )
    }

    pub fn get_all(&self) -> Result<Vec<Reminder>> {
        self.query(
            &format!("SELECT {COLUMNS} FROM reminders ORDER BY dispatch_time"),
            params![],
        )
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Reminder>> {
        self.store.with(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(args, row_to_reminder)?;
            collect_rows(rows, "reminders")
        })
    }
}

fn row_to_reminder(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: uuid_column(row, 0)?,
        user_id: from_sql_id(row.get(1)?),
        guild_id: from_sql_id(row.get(2)?),
        channel_id: from_sql_id(row.get(3)?),
        message_id: from_sql_id(row.get(4)?),
        creation_time: row.get(5)?,
        dispatch_time: row.get(6)?,
        message: row.get(7)?,
    })
}
