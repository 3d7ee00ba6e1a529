use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    error::{AutomationError, Result},
    store::{collect_rows, Store},
    types::{from_sql_id, to_sql_id, uuid_column, Event, Repeat},
};

const COLUMNS: &str = "id, guild_id, dispatch_time, last_run_time, repeat_interval, \
                       repeat_multiplier, is_paused, name, description";

/// CRUD over the `events` table.
#[derive(Debug, Clone)]
pub struct EventRepository {
    store: Store,
}

impl EventRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert a new event. A name already used in the guild is `AlreadyExists`.
    #[instrument(skip(self, event), fields(event_id = %event.id, name = %event.name))]
    pub fn add(&self, event: &Event) -> Result<()> {
        self.store.with(|conn| {
            conn.execute(
                &format!("INSERT INTO events ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    event.id.to_string(),
                    to_sql_id(event.guild_id),
                    event.dispatch_time,
                    event.last_run_time,
                    event.repeat_interval.as_str(),
                    event.repeat_multiplier,
                    event.is_paused,
                    event.name,
                    event.description,
                ],
            )
            .map_err(|e| AutomationError::from_insert(e, "event", event.name.clone()))?;
            debug!("event added");
            Ok(())
        })
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub fn update(&self, event: &Event) -> Result<()> {
        self.store.with(|conn| update_in(conn, event))
    }

    /// Delete the event row. Links go with it (`ON DELETE CASCADE`); the
    /// action payloads do not, so callers normally go through
    /// `EventService::remove_event`.
    #[instrument(skip(self))]
    pub fn remove(&self, id: Uuid) -> Result<()> {
        self.store.with(|conn| remove_in(conn, id))
    }

    pub fn get_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        self.store.with(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM events WHERE id = ?1"),
                    [id.to_string()],
                    row_to_event,
                )
                .optional()?)
        })
    }

    pub fn get_by_name_in_guild(&self, name: &str, guild_id: u64) -> Result<Option<Event>> {
        self.store.with(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM events WHERE guild_id = ?1 AND name = ?2"),
                    params![to_sql_id(guild_id), name],
                    row_to_event,
                )
                .optional()?)
        })
    }

    pub fn get_by_guild(&self, guild_id: u64) -> Result<Vec<Event>> {
        self.query(
            &format!("SELECT {COLUMNS} FROM events WHERE guild_id = ?1 ORDER BY dispatch_time"),
            params![to_sql_id(guild_id)],
        )
    }

    pub fn count_by_guild(&self, guild_id: u64) -> Result<usize> {
        self.store.with(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM events WHERE guild_id = ?1",
                [to_sql_id(guild_id)],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// Events whose dispatch time is strictly before `timestamp`, soonest first.
    ///
    /// For repeating events `dispatch_time` is the anchor, so every repeating
    /// event created before `timestamp` is returned.
    pub fn get_before_timestamp(&self, timestamp: i64) -> Result<Vec<Event>> {
        self.query(
            &format!("SELECT {COLUMNS} FROM events WHERE dispatch_time < ?1 ORDER BY dispatch_time"),
            params![timestamp],
        )
    }

    /// Repeating events that are not paused.
    pub fn get_repeating(&self) -> Result<Vec<Event>> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM events
                 WHERE repeat_interval != ?1 AND is_paused = 0
                 ORDER BY dispatch_time"
            ),
            params![Repeat::No.as_str()],
        )
    }

    pub fn get_all(&self) -> Result<Vec<Event>> {
        self.query(
            &format!("SELECT {COLUMNS} FROM events ORDER BY dispatch_time"),
            params![],
        )
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Event>> {
        self.store.with(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(args, row_to_event)?;
            collect_rows(rows, "events")
        })
    }
}

pub(crate) fn update_in(conn: &Connection, event: &Event) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE events
             SET guild_id = ?2, dispatch_time = ?3, last_run_time = ?4,
                 repeat_interval = ?5, repeat_multiplier = ?6, is_paused = ?7,
                 name = ?8, description = ?9
             WHERE id = ?1",
            params![
                event.id.to_string(),
                to_sql_id(event.guild_id),
                event.dispatch_time,
                event.last_run_time,
                event.repeat_interval.as_str(),
                event.repeat_multiplier,
                event.is_paused,
                event.name,
                event.description,
            ],
        )
        .map_err(|e| AutomationError::from_insert(e, "event", event.name.clone()))?;
    if changed == 0 {
        return Err(AutomationError::NotFound {
            entity: "event",
            id: event.id,
        });
    }
    Ok(())
}

pub(crate) fn remove_in(conn: &Connection, id: Uuid) -> Result<()> {
    let changed = conn.execute("DELETE FROM events WHERE id = ?1", [id.to_string()])?;
    if changed == 0 {
        return Err(AutomationError::NotFound { entity: "event", id });
    }
    debug!(event_id = %id, "event removed");
    Ok(())
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let repeat: String = row.get(4)?;
    let repeat_interval = repeat.parse::<Repeat>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Event {
        id: uuid_column(row, 0)?,
        guild_id: from_sql_id(row.get(1)?),
        dispatch_time: row.get(2)?,
        last_run_time: row.get(3)?,
        repeat_interval,
        repeat_multiplier: row.get(5)?,
        is_paused: row.get(6)?,
        name: row.get(7)?,
        description: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> EventRepository {
        EventRepository::new(Store::open_in_memory().unwrap())
    }

    #[test]
    fn round_trips_every_field() {
        let repo = repo();
        let mut event = Event::create_new(7, 1_000, Repeat::Weekly, 2, "raid", "weekly raid");
        event.last_run_time = Some(999);
        event.is_paused = true;
        repo.add(&event).unwrap();
        assert_eq!(repo.get_by_id(event.id).unwrap(), Some(event.clone()));
        assert_eq!(repo.get_by_name_in_guild("raid", 7).unwrap(), Some(event));
        assert!(repo.get_by_name_in_guild("raid", 8).unwrap().is_none());
    }

    #[test]
    fn duplicate_name_in_guild_is_rejected() {
        let repo = repo();
        repo.add(&Event::create_new(1, 0, Repeat::No, 1, "dup", "")).unwrap();
        let err = repo
            .add(&Event::create_new(1, 5, Repeat::Daily, 1, "dup", ""))
            .unwrap_err();
        assert!(matches!(err, AutomationError::AlreadyExists { entity: "event", .. }));

        // Same name in another guild is fine.
        repo.add(&Event::create_new(2, 0, Repeat::No, 1, "dup", "")).unwrap();
        assert_eq!(repo.count_by_guild(1).unwrap(), 1);
    }

    #[test]
    fn repeating_excludes_paused_and_one_shot() {
        let repo = repo();
        let daily = Event::create_new(1, 0, Repeat::Daily, 1, "daily", "");
        let mut paused = Event::create_new(1, 0, Repeat::Hourly, 1, "paused", "");
        paused.is_paused = true;
        repo.add(&daily).unwrap();
        repo.add(&paused).unwrap();
        repo.add(&Event::create_new(1, 0, Repeat::No, 1, "once", "")).unwrap();

        let ids: Vec<Uuid> = repo.get_repeating().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![daily.id]);
    }

    #[test]
    fn before_timestamp_is_strict() {
        let repo = repo();
        repo.add(&Event::create_new(1, 100, Repeat::No, 1, "a", "")).unwrap();
        repo.add(&Event::create_new(1, 200, Repeat::No, 1, "b", "")).unwrap();
        assert_eq!(repo.get_before_timestamp(200).unwrap().len(), 1);
        assert_eq!(repo.get_all().unwrap().len(), 2);
    }

    #[test]
    fn an_undecodable_row_does_not_hide_the_others() {
        let store = Store::open_in_memory().unwrap();
        let repo = EventRepository::new(store.clone());
        let good = Event::create_new(1, 100, Repeat::Daily, 1, "good", "");
        let bad = Event::create_new(1, 50, Repeat::Daily, 1, "bad", "");
        repo.add(&good).unwrap();
        repo.add(&bad).unwrap();
        store
            .with(|conn| {
                conn.execute(
                    "UPDATE events SET repeat_interval = 'Monthly' WHERE id = ?1",
                    [bad.id.to_string()],
                )?;
                Ok(())
            })
            .unwrap();

        let ids: Vec<Uuid> = repo.get_all().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![good.id]);
        assert_eq!(repo.get_before_timestamp(1_000).unwrap().len(), 1);

        let err = repo.get_by_id(bad.id).unwrap_err();
        assert!(matches!(err, AutomationError::InvalidData(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn update_missing_event_is_not_found() {
        let repo = repo();
        let event = Event::create_new(1, 0, Repeat::No, 1, "ghost", "");
        assert!(matches!(repo.update(&event), Err(AutomationError::NotFound { .. })));
        assert!(matches!(repo.remove(event.id), Err(AutomationError::NotFound { .. })));
    }
}
