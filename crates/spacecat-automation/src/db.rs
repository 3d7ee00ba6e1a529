use rusqlite::Connection;

use crate::error::Result;

/// Initialise the automation schema in `conn`.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_reminders_table(conn)?;
    create_events_table(conn)?;
    create_event_actions_table(conn)?;
    create_action_tables(conn)?;
    Ok(())
}

fn create_reminders_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            id            TEXT    NOT NULL PRIMARY KEY,
            user_id       INTEGER NOT NULL,
            guild_id      INTEGER NOT NULL,
            channel_id    INTEGER NOT NULL,
            message_id    INTEGER NOT NULL,
            creation_time INTEGER NOT NULL,
            dispatch_time INTEGER NOT NULL,
            message       TEXT    NOT NULL
        ) STRICT;

        -- Sweep query: SELECT … WHERE dispatch_time < ? ORDER BY dispatch_time
        CREATE INDEX IF NOT EXISTS idx_reminders_dispatch ON reminders (dispatch_time);
        CREATE INDEX IF NOT EXISTS idx_reminders_owner ON reminders (guild_id, user_id);
        ",
    )?;
    Ok(())
}

fn create_events_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id                TEXT    NOT NULL PRIMARY KEY,
            guild_id          INTEGER NOT NULL,
            dispatch_time     INTEGER NOT NULL,   -- anchor time for repeating events
            last_run_time     INTEGER,            -- NULL until the first dispatch
            repeat_interval   TEXT    NOT NULL,   -- Repeat name: No/Hourly/Daily/Weekly
            repeat_multiplier INTEGER NOT NULL DEFAULT 1,
            is_paused         INTEGER NOT NULL DEFAULT 0,
            name              TEXT    NOT NULL,
            description       TEXT    NOT NULL DEFAULT '',
            UNIQUE (guild_id, name)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_events_dispatch ON events (dispatch_time);
        ",
    )?;
    Ok(())
}

/// Link rows forming each event's singly-linked action chain.
/// `previous_id` is the nil UUID for the head of the chain.
fn create_event_actions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS event_actions (
            id          TEXT NOT NULL PRIMARY KEY,
            event_id    TEXT NOT NULL REFERENCES events (id) ON DELETE CASCADE,
            action_type TEXT NOT NULL,
            action_id   TEXT NOT NULL,
            previous_id TEXT NOT NULL,
            UNIQUE (event_id, action_id)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_event_actions_event ON event_actions (event_id);
        CREATE INDEX IF NOT EXISTS idx_event_actions_previous ON event_actions (previous_id);
        ",
    )?;
    Ok(())
}

fn create_action_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS action_message (
            id              TEXT    NOT NULL PRIMARY KEY,
            text_channel_id INTEGER NOT NULL,
            message         TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS action_broadcast (
            id              TEXT    NOT NULL PRIMARY KEY,
            text_channel_id INTEGER NOT NULL,
            title           TEXT    NOT NULL,
            message         TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS action_voice_kick (
            id               TEXT    NOT NULL PRIMARY KEY,
            voice_channel_id INTEGER NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS action_voice_move (
            id                       TEXT    NOT NULL PRIMARY KEY,
            current_voice_channel_id INTEGER NOT NULL,
            new_voice_channel_id     INTEGER NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS action_channel_private (
            id         TEXT    NOT NULL PRIMARY KEY,
            channel_id INTEGER NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS action_channel_public (
            id         TEXT    NOT NULL PRIMARY KEY,
            channel_id INTEGER NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 9);
    }
}
