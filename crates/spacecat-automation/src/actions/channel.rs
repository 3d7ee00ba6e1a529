use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{mismatch, Action, ActionKind, ActionRepository};
use crate::{
    error::{AutomationError, Result},
    store::Store,
    types::{from_sql_id, to_sql_id, uuid_column},
};

/// Payload shared by `channel_private` and `channel_public`; the variant of
/// [`Action`] wrapping it decides which visibility is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelVisibilityAction {
    pub id: Uuid,
    pub channel_id: u64,
}

impl ChannelVisibilityAction {
    pub fn create_new(channel_id: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel_id,
        }
    }

    pub(super) fn describe(&self, visibility: &str) -> String {
        format!(
            "Sets channel <#{}> to {visibility} visibility.",
            self.channel_id
        )
    }
}

/// One repository type serves both visibility variants, each with its own table.
#[derive(Debug, Clone)]
pub struct ChannelVisibilityRepository {
    store: Store,
    kind: ActionKind,
    table: &'static str,
}

impl ChannelVisibilityRepository {
    pub fn private(store: Store) -> Self {
        Self {
            store,
            kind: ActionKind::ChannelPrivate,
            table: "action_channel_private",
        }
    }

    pub fn public(store: Store) -> Self {
        Self {
            store,
            kind: ActionKind::ChannelPublic,
            table: "action_channel_public",
        }
    }

    fn wrap(&self, payload: ChannelVisibilityAction) -> Action {
        match self.kind {
            ActionKind::ChannelPublic => Action::ChannelPublic(payload),
            _ => Action::ChannelPrivate(payload),
        }
    }
}

impl ActionRepository for ChannelVisibilityRepository {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn store(&self) -> &Store {
        &self.store
    }

    fn find_in(&self, conn: &Connection, id: Uuid) -> Result<Option<Action>> {
        let payload = conn
            .query_row(
                &format!("SELECT id, channel_id FROM {} WHERE id = ?1", self.table),
                [id.to_string()],
                |row| {
                    Ok(ChannelVisibilityAction {
                        id: uuid_column(row, 0)?,
                        channel_id: from_sql_id(row.get(1)?),
                    })
                },
            )
            .optional()?;
        Ok(payload.map(|p| self.wrap(p)))
    }

    fn insert_in(&self, conn: &Connection, action: &Action) -> Result<()> {
        let a = match (self.kind, action) {
            (ActionKind::ChannelPrivate, Action::ChannelPrivate(a))
            | (ActionKind::ChannelPublic, Action::ChannelPublic(a)) => a,
            _ => return Err(mismatch(self.kind, action)),
        };
        conn.execute(
            &format!("INSERT INTO {} (id, channel_id) VALUES (?1, ?2)", self.table),
            params![a.id.to_string(), to_sql_id(a.channel_id)],
        )
        .map_err(|e| AutomationError::from_insert(e, "channel action", a.id.to_string()))?;
        Ok(())
    }

    fn delete_in(&self, conn: &Connection, id: Uuid) -> Result<()> {
        let changed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table),
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(AutomationError::NotFound {
                entity: "channel action",
                id,
            });
        }
        Ok(())
    }
}
