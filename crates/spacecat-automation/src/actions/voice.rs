use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{mismatch, Action, ActionKind, ActionRepository};
use crate::{
    error::{AutomationError, Result},
    store::Store,
    types::{from_sql_id, to_sql_id, uuid_column},
};

/// Disconnects every member from a voice channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceKickAction {
    pub id: Uuid,
    pub voice_channel_id: u64,
}

impl VoiceKickAction {
    pub fn create_new(voice_channel_id: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            voice_channel_id,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "Kicks all users out of voice channel <#{}>.",
            self.voice_channel_id
        )
    }
}

/// Moves every member of one voice channel into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMoveAction {
    pub id: Uuid,
    pub current_voice_channel_id: u64,
    pub new_voice_channel_id: u64,
}

impl VoiceMoveAction {
    pub fn create_new(current_voice_channel_id: u64, new_voice_channel_id: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            current_voice_channel_id,
            new_voice_channel_id,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "Moves all users from voice channel <#{}> to <#{}>.",
            self.current_voice_channel_id, self.new_voice_channel_id
        )
    }
}

#[derive(Debug, Clone)]
pub struct VoiceKickActionRepository {
    store: Store,
}

impl VoiceKickActionRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl ActionRepository for VoiceKickActionRepository {
    fn kind(&self) -> ActionKind {
        ActionKind::VoiceKick
    }

    fn store(&self) -> &Store {
        &self.store
    }

    fn find_in(&self, conn: &Connection, id: Uuid) -> Result<Option<Action>> {
        Ok(conn
            .query_row(
                "SELECT id, voice_channel_id FROM action_voice_kick WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Action::VoiceKick(VoiceKickAction {
                        id: uuid_column(row, 0)?,
                        voice_channel_id: from_sql_id(row.get(1)?),
                    }))
                },
            )
            .optional()?)
    }

    fn insert_in(&self, conn: &Connection, action: &Action) -> Result<()> {
        let Action::VoiceKick(a) = action else {
            return Err(mismatch(self.kind(), action));
        };
        conn.execute(
            "INSERT INTO action_voice_kick (id, voice_channel_id) VALUES (?1, ?2)",
            params![a.id.to_string(), to_sql_id(a.voice_channel_id)],
        )
        .map_err(|e| AutomationError::from_insert(e, "voice kick action", a.id.to_string()))?;
        Ok(())
    }

    fn delete_in(&self, conn: &Connection, id: Uuid) -> Result<()> {
        let changed =
            conn.execute("DELETE FROM action_voice_kick WHERE id = ?1", [id.to_string()])?;
        if changed == 0 {
            return Err(AutomationError::NotFound {
                entity: "voice kick action",
                id,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct VoiceMoveActionRepository {
    store: Store,
}

impl VoiceMoveActionRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl ActionRepository for VoiceMoveActionRepository {
    fn kind(&self) -> ActionKind {
        ActionKind::VoiceMove
    }

    fn store(&self) -> &Store {
        &self.store
    }

    fn find_in(&self, conn: &Connection, id: Uuid) -> Result<Option<Action>> {
        Ok(conn
            .query_row(
                "SELECT id, current_voice_channel_id, new_voice_channel_id
                 FROM action_voice_move WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Action::VoiceMove(VoiceMoveAction {
                        id: uuid_column(row, 0)?,
                        current_voice_channel_id: from_sql_id(row.get(1)?),
                        new_voice_channel_id: from_sql_id(row.get(2)?),
                    }))
                },
            )
            .optional()?)
    }

    fn insert_in(&self, conn: &Connection, action: &Action) -> Result<()> {
        let Action::VoiceMove(a) = action else {
            return Err(mismatch(self.kind(), action));
        };
        conn.execute(
            "INSERT INTO action_voice_move (id, current_voice_channel_id, new_voice_channel_id)
             VALUES (?1, ?2, ?3)",
            params![
                a.id.to_string(),
                to_sql_id(a.current_voice_channel_id),
                to_sql_id(a.new_voice_channel_id)
            ],
        )
        .map_err(|e| AutomationError::from_insert(e, "voice move action", a.id.to_string()))?;
        Ok(())
    }

    fn delete_in(&self, conn: &Connection, id: Uuid) -> Result<()> {
        let changed =
            conn.execute("DELETE FROM action_voice_move WHERE id = ?1", [id.to_string()])?;
        if changed == 0 {
            return Err(AutomationError::NotFound {
                entity: "voice move action",
                id,
            });
        }
        Ok(())
    }
}
