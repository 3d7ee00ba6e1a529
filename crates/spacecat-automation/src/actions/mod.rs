//! Action variants attachable to an event, and the repositories that persist
//! their payloads.
//!
//! Each variant lives in its own table. [`ActionRegistry`] maps a stored type
//! name back to the repository that can load it.

mod broadcast;
mod channel;
mod message;
mod voice;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::Result, store::Store};

pub use broadcast::{BroadcastAction, BroadcastActionRepository};
pub use channel::{ChannelVisibilityAction, ChannelVisibilityRepository};
pub use message::{MessageAction, MessageActionRepository};
pub use voice::{VoiceKickAction, VoiceKickActionRepository, VoiceMoveAction, VoiceMoveActionRepository};

/// Discriminant of [`Action`]; its string form is the stored type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Message,
    Broadcast,
    VoiceKick,
    VoiceMove,
    ChannelPrivate,
    ChannelPublic,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Message,
        ActionKind::Broadcast,
        ActionKind::VoiceKick,
        ActionKind::VoiceMove,
        ActionKind::ChannelPrivate,
        ActionKind::ChannelPublic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Message => "message",
            ActionKind::Broadcast => "broadcast",
            ActionKind::VoiceKick => "voice_kick",
            ActionKind::VoiceMove => "voice_move",
            ActionKind::ChannelPrivate => "channel_private",
            ActionKind::ChannelPublic => "channel_public",
        }
    }

    /// Notification kind emitted when an action of this type fires.
    pub fn dispatch_kind(self) -> String {
        format!("{}_action", self.as_str())
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown action type: {s}"))
    }
}

/// One concrete effect an event can trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Message(MessageAction),
    Broadcast(BroadcastAction),
    VoiceKick(VoiceKickAction),
    VoiceMove(VoiceMoveAction),
    ChannelPrivate(ChannelVisibilityAction),
    ChannelPublic(ChannelVisibilityAction),
}

impl Action {
    pub fn id(&self) -> Uuid {
        match self {
            Action::Message(a) => a.id,
            Action::Broadcast(a) => a.id,
            Action::VoiceKick(a) => a.id,
            Action::VoiceMove(a) => a.id,
            Action::ChannelPrivate(a) | Action::ChannelPublic(a) => a.id,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Message(_) => ActionKind::Message,
            Action::Broadcast(_) => ActionKind::Broadcast,
            Action::VoiceKick(_) => ActionKind::VoiceKick,
            Action::VoiceMove(_) => ActionKind::VoiceMove,
            Action::ChannelPrivate(_) => ActionKind::ChannelPrivate,
            Action::ChannelPublic(_) => ActionKind::ChannelPublic,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Human-readable summary shown when listing an event's actions.
    pub fn describe(&self) -> String {
        match self {
            Action::Message(a) => a.describe(),
            Action::Broadcast(a) => a.describe(),
            Action::VoiceKick(a) => a.describe(),
            Action::VoiceMove(a) => a.describe(),
            Action::ChannelPrivate(a) => a.describe("private"),
            Action::ChannelPublic(a) => a.describe("public"),
        }
    }
}

impl From<MessageAction> for Action {
    fn from(a: MessageAction) -> Self {
        Action::Message(a)
    }
}

impl From<BroadcastAction> for Action {
    fn from(a: BroadcastAction) -> Self {
        Action::Broadcast(a)
    }
}

impl From<VoiceKickAction> for Action {
    fn from(a: VoiceKickAction) -> Self {
        Action::VoiceKick(a)
    }
}

impl From<VoiceMoveAction> for Action {
    fn from(a: VoiceMoveAction) -> Self {
        Action::VoiceMove(a)
    }
}

/// Persistence for one action variant.
///
/// Implementors provide the connection-level operations; the store-level
/// `get_by_id` / `add` / `remove` come for free. The `_in` forms let
/// `EventService` compose several repositories inside one transaction.
pub trait ActionRepository: Send + Sync {
    /// The variant this repository stores.
    fn kind(&self) -> ActionKind;

    fn store(&self) -> &Store;

    fn find_in(&self, conn: &Connection, id: Uuid) -> Result<Option<Action>>;

    /// Insert `action`. Fails with `InvalidOperation` if it is a different variant.
    fn insert_in(&self, conn: &Connection, action: &Action) -> Result<()>;

    fn delete_in(&self, conn: &Connection, id: Uuid) -> Result<()>;

    fn get_by_id(&self, id: Uuid) -> Result<Option<Action>> {
        self.store().with(|conn| self.find_in(conn, id))
    }

    fn add(&self, action: &Action) -> Result<()> {
        self.store().with(|conn| self.insert_in(conn, action))
    }

    fn remove(&self, id: Uuid) -> Result<()> {
        self.store().with(|conn| self.delete_in(conn, id))
    }
}

/// Type name → repository lookup table, owned by `EventService`.
#[derive(Default)]
pub struct ActionRegistry {
    repos: HashMap<ActionKind, Box<dyn ActionRepository>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a repository for every built-in variant.
    pub fn with_defaults(store: &Store) -> Self {
        let mut registry = Self::new();
        registry.register(MessageActionRepository::new(store.clone()));
        registry.register(BroadcastActionRepository::new(store.clone()));
        registry.register(VoiceKickActionRepository::new(store.clone()));
        registry.register(VoiceMoveActionRepository::new(store.clone()));
        registry.register(ChannelVisibilityRepository::private(store.clone()));
        registry.register(ChannelVisibilityRepository::public(store.clone()));
        registry
    }

    /// Add or replace the repository for `repo.kind()`.
    pub fn register(&mut self, repo: impl ActionRepository + 'static) {
        self.repos.insert(repo.kind(), Box::new(repo));
    }

    pub fn get(&self, kind: ActionKind) -> Option<&dyn ActionRepository> {
        self.repos.get(&kind).map(|r| r.as_ref())
    }

    /// Look up by stored type name. Unknown names resolve to `None`.
    pub fn get_by_name(&self, type_name: &str) -> Option<&dyn ActionRepository> {
        type_name.parse::<ActionKind>().ok().and_then(|kind| self.get(kind))
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.repos.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("ActionRegistry").field("kinds", &kinds).finish()
    }
}

fn mismatch(expected: ActionKind, action: &Action) -> crate::error::AutomationError {
    crate::error::AutomationError::InvalidOperation(format!(
        "{expected} repository cannot store a {} action",
        action.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_parse_back() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert_eq!(ActionKind::VoiceKick.dispatch_kind(), "voice_kick_action");
        assert!("teleport".parse::<ActionKind>().is_err());
    }

    #[test]
    fn defaults_cover_every_kind() {
        let store = Store::open_in_memory().unwrap();
        let registry = ActionRegistry::with_defaults(&store);
        assert_eq!(registry.len(), ActionKind::ALL.len());
        for kind in ActionKind::ALL {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
        assert!(registry.get_by_name("teleport").is_none());
    }

    #[test]
    fn every_variant_round_trips_through_its_repository() {
        let store = Store::open_in_memory().unwrap();
        let registry = ActionRegistry::with_defaults(&store);
        let actions: Vec<Action> = vec![
            MessageAction::create_new(1, "hello").into(),
            BroadcastAction::create_new(2, "News", "body").into(),
            VoiceKickAction::create_new(3).into(),
            VoiceMoveAction::create_new(4, u64::MAX).into(),
            Action::ChannelPrivate(ChannelVisibilityAction::create_new(5)),
            Action::ChannelPublic(ChannelVisibilityAction::create_new(6)),
        ];

        for action in &actions {
            let repo = registry.get(action.kind()).unwrap();
            repo.add(action).unwrap();
            assert_eq!(repo.get_by_id(action.id()).unwrap().as_ref(), Some(action));
            repo.remove(action.id()).unwrap();
            assert!(repo.get_by_id(action.id()).unwrap().is_none());
        }
    }

    #[test]
    fn private_and_public_tables_are_separate() {
        let store = Store::open_in_memory().unwrap();
        let registry = ActionRegistry::with_defaults(&store);
        let action = Action::ChannelPrivate(ChannelVisibilityAction::create_new(9));
        registry.get(ActionKind::ChannelPrivate).unwrap().add(&action).unwrap();

        let public = registry.get(ActionKind::ChannelPublic).unwrap();
        assert!(public.get_by_id(action.id()).unwrap().is_none());
        assert!(public.add(&action).is_err());
    }

    #[test]
    fn descriptions() {
        let msg = Action::from(MessageAction::create_new(42, "a fairly long announcement text"));
        assert_eq!(
            msg.describe(),
            "Sends a message starting with 'a fairly long announ' to channel <#42>."
        );
        let moved = Action::from(VoiceMoveAction::create_new(1, 2));
        assert_eq!(moved.describe(), "Moves all users from voice channel <#1> to <#2>.");
        let private = Action::ChannelPrivate(ChannelVisibilityAction::create_new(3));
        assert_eq!(private.describe(), "Sets channel <#3> to private visibility.");
    }
}
