use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{mismatch, Action, ActionKind, ActionRepository};
use crate::{
    error::{AutomationError, Result},
    store::Store,
    types::{from_sql_id, to_sql_id, uuid_column},
};

/// Posts a titled announcement to a text channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAction {
    pub id: Uuid,
    pub text_channel_id: u64,
    pub title: String,
    pub message: String,
}

impl BroadcastAction {
    pub fn create_new(
        text_channel_id: u64,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text_channel_id,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "Sends a broadcast titled '{}' to channel <#{}>.",
            self.title, self.text_channel_id
        )
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastActionRepository {
    store: Store,
}

impl BroadcastActionRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl ActionRepository for BroadcastActionRepository {
    fn kind(&self) -> ActionKind {
        ActionKind::Broadcast
    }

    fn store(&self) -> &Store {
        &self.store
    }

    fn find_in(&self, conn: &Connection, id: Uuid) -> Result<Option<Action>> {
        Ok(conn
            .query_row(
                "SELECT id, text_channel_id, title, message FROM action_broadcast WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Action::Broadcast(BroadcastAction {
                        id: uuid_column(row, 0)?,
                        text_channel_id: from_sql_id(row.get(1)?),
                        title: row.get(2)?,
                        message: row.get(3)?,
                    }))
                },
            )
            .optional()?)
    }

    fn insert_in(&self, conn: &Connection, action: &Action) -> Result<()> {
        let Action::Broadcast(a) = action else {
            return Err(mismatch(self.kind(), action));
        };
        conn.execute(
            "INSERT INTO action_broadcast (id, text_channel_id, title, message)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                a.id.to_string(),
                to_sql_id(a.text_channel_id),
                a.title,
                a.message
            ],
        )
        .map_err(|e| AutomationError::from_insert(e, "broadcast action", a.id.to_string()))?;
        Ok(())
    }

    fn delete_in(&self, conn: &Connection, id: Uuid) -> Result<()> {
        let changed =
            conn.execute("DELETE FROM action_broadcast WHERE id = ?1", [id.to_string()])?;
        if changed == 0 {
            return Err(AutomationError::NotFound {
                entity: "broadcast action",
                id,
            });
        }
        Ok(())
    }
}
