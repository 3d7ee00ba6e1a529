use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{AutomationError, Result},
    store::{collect_rows, Store},
    types::{uuid_column, EventAction},
};

const COLUMNS: &str = "id, event_id, action_type, action_id, previous_id";

/// CRUD over `event_actions`, the link rows that order each event's actions.
///
/// Rows come back in no particular order; `EventService` rebuilds the chain
/// by walking `previous_id` from the sentinel.
#[derive(Debug, Clone)]
pub struct EventActionRepository {
    store: Store,
}

impl EventActionRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn add(&self, link: &EventAction) -> Result<()> {
        self.store.with(|conn| add_in(conn, link))
    }

    pub fn update(&self, link: &EventAction) -> Result<()> {
        self.store.with(|conn| update_in(conn, link))
    }

    pub fn remove(&self, id: Uuid) -> Result<()> {
        self.store.with(|conn| remove_in(conn, id))
    }

    pub fn get_by_id(&self, id: Uuid) -> Result<Option<EventAction>> {
        self.store.with(|conn| get_by_id_in(conn, id))
    }

    pub fn get_by_event(&self, event_id: Uuid) -> Result<Vec<EventAction>> {
        self.store.with(|conn| get_by_event_in(conn, event_id))
    }

    /// Every link to `action_id`, across all events.
    pub fn get_by_action(&self, action_id: Uuid) -> Result<Vec<EventAction>> {
        self.store.with(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM event_actions WHERE action_id = ?1"))?;
            let rows = stmt.query_map([action_id.to_string()], row_to_link)?;
            collect_rows(rows, "event_actions")
        })
    }

    pub fn get_by_action_in_event(
        &self,
        action_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<EventAction>> {
        self.store
            .with(|conn| get_by_action_in_event_in(conn, action_id, event_id))
    }

    /// The link that follows `link_id` in its chain.
    pub fn get_by_previous(&self, link_id: Uuid) -> Result<Option<EventAction>> {
        self.store.with(|conn| get_by_previous_in(conn, link_id))
    }
}

// Connection-level operations, shared with the service so chain edits can be
// composed inside one transaction.

pub(crate) fn add_in(conn: &Connection, link: &EventAction) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO event_actions ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
        params![
            link.id.to_string(),
            link.event_id.to_string(),
            link.action_type,
            link.action_id.to_string(),
            link.previous_id.to_string(),
        ],
    )
    .map_err(|e| AutomationError::from_insert(e, "event action", link.action_id.to_string()))?;
    debug!(link_id = %link.id, event_id = %link.event_id, "action linked");
    Ok(())
}

pub(crate) fn update_in(conn: &Connection, link: &EventAction) -> Result<()> {
    let changed = conn.execute(
        "UPDATE event_actions
         SET event_id = ?2, action_type = ?3, action_id = ?4, previous_id = ?5
         WHERE id = ?1",
        params![
            link.id.to_string(),
            link.event_id.to_string(),
            link.action_type,
            link.action_id.to_string(),
            link.previous_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(AutomationError::NotFound {
            entity: "event action",
            id: link.id,
        });
    }
    Ok(())
}

pub(crate) fn remove_in(conn: &Connection, id: Uuid) -> Result<()> {
    let changed = conn.execute("DELETE FROM event_actions WHERE id = ?1", [id.to_string()])?;
    if changed == 0 {
        return Err(AutomationError::NotFound {
            entity: "event action",
            id,
        });
    }
    Ok(())
}

pub(crate) fn get_by_id_in(conn: &Connection, id: Uuid) -> Result<Option<EventAction>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM event_actions WHERE id = ?1"),
            [id.to_string()],
            row_to_link,
        )
        .optional()?)
}

pub(crate) fn get_by_event_in(conn: &Connection, event_id: Uuid) -> Result<Vec<EventAction>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {COLUMNS} FROM event_actions WHERE event_id = ?1"))?;
    let rows = stmt.query_map([event_id.to_string()], row_to_link)?;
    collect_rows(rows, "event_actions")
}

pub(crate) fn get_by_action_in_event_in(
    conn: &Connection,
    action_id: Uuid,
    event_id: Uuid,
) -> Result<Option<EventAction>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM event_actions WHERE action_id = ?1 AND event_id = ?2"),
            [action_id.to_string(), event_id.to_string()],
            row_to_link,
        )
        .optional()?)
}

pub(crate) fn get_by_previous_in(conn: &Connection, link_id: Uuid) -> Result<Option<EventAction>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM event_actions WHERE previous_id = ?1"),
            [link_id.to_string()],
            row_to_link,
        )
        .optional()?)
}

fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventAction> {
    Ok(EventAction {
        id: uuid_column(row, 0)?,
        event_id: uuid_column(row, 1)?,
        action_type: row.get(2)?,
        action_id: uuid_column(row, 3)?,
        previous_id: uuid_column(row, 4)?,
    })
}
