use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{mismatch, Action, ActionKind, ActionRepository};
use crate::{
    error::{AutomationError, Result},
    store::Store,
    types::{from_sql_id, to_sql_id, uuid_column},
};

/// Posts `message` to a text channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAction {
    pub id: Uuid,
    pub text_channel_id: u64,
    pub message: String,
}

impl MessageAction {
    pub fn create_new(text_channel_id: u64, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text_channel_id,
            message: message.into(),
        }
    }

    pub fn describe(&self) -> String {
        let preview: String = self.message.chars().take(20).collect();
        format!(
            "Sends a message starting with '{preview}' to channel <#{}>.",
            self.text_channel_id
        )
    }
}

#[derive(Debug, Clone)]
pub struct MessageActionRepository {
    store: Store,
}

impl MessageActionRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl ActionRepository for MessageActionRepository {
    fn kind(&self) -> ActionKind {
        ActionKind::Message
    }

    fn store(&self) -> &Store {
        &self.store
    }

    fn find_in(&self, conn: &Connection, id: Uuid) -> Result<Option<Action>> {
        Ok(conn
            .query_row(
                "SELECT id, text_channel_id, message FROM action_message WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Action::Message(MessageAction {
                        id: uuid_column(row, 0)?,
                        text_channel_id: from_sql_id(row.get(1)?),
                        message: row.get(2)?,
                    }))
                },
            )
            .optional()?)
    }

    fn insert_in(&self, conn: &Connection, action: &Action) -> Result<()> {
        let Action::Message(a) = action else {
            return Err(mismatch(self.kind(), action));
        };
        conn.execute(
            "INSERT INTO action_message (id, text_channel_id, message) VALUES (?1, ?2, ?3)",
            params![a.id.to_string(), to_sql_id(a.text_channel_id), a.message],
        )
        .map_err(|e| AutomationError::from_insert(e, "message action", a.id.to_string()))?;
        Ok(())
    }

    fn delete_in(&self, conn: &Connection, id: Uuid) -> Result<()> {
        let changed = conn.execute("DELETE FROM action_message WHERE id = ?1", [id.to_string()])?;
        if changed == 0 {
            return Err(AutomationError::NotFound {
                entity: "message action",
                id,
            });
        }
        Ok(())
    }
}
