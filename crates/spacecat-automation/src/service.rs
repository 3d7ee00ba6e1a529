use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::Connection;
use spacecat_core::Clock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    actions::{Action, ActionRegistry, ActionRepository},
    error::{AutomationError, Result},
    event_actions::{self, EventActionRepository},
    events::{self, EventRepository},
    sink::{Notification, NotificationSink},
    store::Store,
    types::{Event, EventAction, SENTINEL_ID},
};

/// Presents each event's actions as an ordered list and edits that order.
///
/// Every chain mutation runs in a single store transaction, so a failure
/// part-way leaves the chain exactly as it was.
pub struct EventService {
    store: Store,
    events: EventRepository,
    links: EventActionRepository,
    registry: ActionRegistry,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl EventService {
    pub fn new(
        store: Store,
        registry: ActionRegistry,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events: EventRepository::new(store.clone()),
            links: EventActionRepository::new(store.clone()),
            store,
            registry,
            sink,
            clock,
        }
    }

    pub fn events(&self) -> &EventRepository {
        &self.events
    }

    pub fn links(&self) -> &EventActionRepository {
        &self.links
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The event's actions in chain order.
    ///
    /// Links are read once up front; each action payload is loaded as the
    /// iterator advances. Links whose type has no repository, or whose
    /// payload row is gone, are skipped.
    pub fn get_actions(&self, event: &Event) -> Result<ActionChain<'_>> {
        let links = self.links.get_by_event(event.id)?;
        Ok(ActionChain::new(event.id, links, &self.registry))
    }

    /// The action at 1-based `index`, if the chain is that long.
    pub fn get_action_at_position(&self, event: &Event, index: usize) -> Result<Option<Action>> {
        if index == 0 {
            return Ok(None);
        }
        self.get_actions(event)?.nth(index - 1).transpose()
    }

    /// Number of links reachable from the head of the chain.
    pub fn action_count(&self, event: &Event) -> Result<usize> {
        self.store
            .with(|conn| Ok(ordered_links(conn, event.id)?.len()))
    }

    /// Persist `action` and append it to the end of the event's chain.
    #[instrument(skip(self, event, action), fields(event_id = %event.id, action_id = %action.id()))]
    pub fn add_action(&self, event: &Event, action: &Action) -> Result<()> {
        let repo = self.repo_for(action.type_name())?;
        self.store.transaction(|tx| {
            if event_actions::get_by_action_in_event_in(tx, action.id(), event.id)?.is_some() {
                return Err(AutomationError::ChainCorruption(format!(
                    "action {} is already linked to event {}",
                    action.id(),
                    event.id
                )));
            }
            let previous_id = ordered_links(tx, event.id)?
                .last()
                .map_or(SENTINEL_ID, |link| link.id);

            repo.insert_in(tx, action)?;
            event_actions::add_in(
                tx,
                &EventAction::create_new(event.id, action.type_name(), action.id(), previous_id),
            )
        })?;
        info!(kind = action.type_name(), "action added to event");
        Ok(())
    }

    /// Delete `action` and splice its link out of the event's chain.
    #[instrument(skip(self, event, action), fields(event_id = %event.id, action_id = %action.id()))]
    pub fn remove_action(&self, event: &Event, action: &Action) -> Result<()> {
        self.store.transaction(|tx| {
            let link = event_actions::get_by_action_in_event_in(tx, action.id(), event.id)?
                .ok_or(AutomationError::NotFound {
                    entity: "event action",
                    id: action.id(),
                })?;
            self.delete_payload(tx, &link)?;

            if let Some(mut successor) = event_actions::get_by_previous_in(tx, link.id)? {
                successor.previous_id = link.previous_id;
                event_actions::update_in(tx, &successor)?;
            }
            event_actions::remove_in(tx, link.id)
        })?;
        info!("action removed from event");
        Ok(())
    }

    /// Move the action at 1-based `from_index` to `new_index`.
    ///
    /// `new_index` is clamped into `1..=len`. Only links whose predecessor
    /// actually changes are rewritten: the moved link, its old successor and
    /// its new successor.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub fn reorder_action(&self, event: &Event, from_index: usize, new_index: usize) -> Result<()> {
        self.store.transaction(|tx| {
            let chain = ordered_links(tx, event.id)?;
            let len = chain.len();
            if from_index == 0 || from_index > len {
                return Err(AutomationError::InvalidPosition {
                    index: from_index,
                    len,
                });
            }
            let to_index = new_index.clamp(1, len);
            if to_index == from_index {
                return Ok(());
            }

            let mut order = chain;
            let moved = order.remove(from_index - 1);
            order.insert(to_index - 1, moved);

            let mut previous_id = SENTINEL_ID;
            let mut rewritten = 0;
            for link in &order {
                if link.previous_id != previous_id {
                    let relinked = EventAction {
                        previous_id,
                        ..link.clone()
                    };
                    event_actions::update_in(tx, &relinked)?;
                    rewritten += 1;
                }
                previous_id = link.id;
            }
            debug!(from_index, to_index, rewritten, "action chain reordered");
            Ok(())
        })
    }

    /// Delete the event with every linked action and link, atomically.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub fn remove_event(&self, event: &Event) -> Result<()> {
        self.store.transaction(|tx| {
            for link in event_actions::get_by_event_in(tx, event.id)? {
                self.delete_payload(tx, &link)?;
                event_actions::remove_in(tx, link.id)?;
            }
            events::remove_in(tx, event.id)
        })?;
        info!(name = %event.name, "event removed");
        Ok(())
    }

    /// Stamp `last_run_time`, persist it, then emit one notification per
    /// action in chain order. Returns the updated event.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub fn dispatch_event(&self, event: &Event) -> Result<Event> {
        let mut event = event.clone();
        event.last_run_time = Some(self.clock.now());
        self.events.update(&event)?;

        let mut dispatched = 0usize;
        for action in self.get_actions(&event)? {
            let action = action?;
            debug!(kind = action.type_name(), action_id = %action.id(), "dispatching action");
            self.sink.dispatch(Notification::action(action))?;
            dispatched += 1;
        }
        info!(name = %event.name, dispatched, "event dispatched");
        Ok(event)
    }

    fn repo_for(&self, type_name: &str) -> Result<&dyn ActionRepository> {
        self.registry
            .get_by_name(type_name)
            .ok_or_else(|| AutomationError::UnknownActionType(type_name.to_string()))
    }

    /// Delete the payload row behind `link`. A missing row or unregistered
    /// type is logged and tolerated so stale links can still be cleaned up.
    fn delete_payload(&self, conn: &Connection, link: &EventAction) -> Result<()> {
        let Some(repo) = self.registry.get_by_name(&link.action_type) else {
            warn!(link_id = %link.id, action_type = %link.action_type, "no repository for linked action");
            return Ok(());
        };
        match repo.delete_in(conn, link.action_id) {
            Ok(()) => Ok(()),
            Err(AutomationError::NotFound { .. }) => {
                warn!(link_id = %link.id, action_id = %link.action_id, "linked action already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for EventService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventService")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Lazy walk over an event's action chain, head first.
///
/// Finite and single-use: each consumed link is taken out of the lookup map,
/// so a corrupt chain with a cycle still terminates.
pub struct ActionChain<'a> {
    by_previous: HashMap<Uuid, EventAction>,
    cursor: Uuid,
    registry: &'a ActionRegistry,
}

impl<'a> ActionChain<'a> {
    fn new(event_id: Uuid, links: Vec<EventAction>, registry: &'a ActionRegistry) -> Self {
        Self {
            by_previous: index_by_previous(event_id, links),
            cursor: SENTINEL_ID,
            registry,
        }
    }
}

impl Iterator for ActionChain<'_> {
    type Item = Result<Action>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let link = self.by_previous.remove(&self.cursor)?;
            self.cursor = link.id;

            let Some(repo) = self.registry.get_by_name(&link.action_type) else {
                warn!(link_id = %link.id, action_type = %link.action_type, "skipping link with unknown action type");
                continue;
            };
            match repo.get_by_id(link.action_id) {
                Ok(Some(action)) => return Some(Ok(action)),
                Ok(None) => {
                    warn!(link_id = %link.id, action_id = %link.action_id, "skipping orphaned link");
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn index_by_previous(event_id: Uuid, links: Vec<EventAction>) -> HashMap<Uuid, EventAction> {
    let mut by_previous = HashMap::with_capacity(links.len());
    for link in links {
        if let Some(dup) = by_previous.insert(link.previous_id, link) {
            warn!(%event_id, link_id = %dup.id, "two links share a predecessor; one is unreachable");
        }
    }
    by_previous
}

/// Links of `event_id` in chain order, without resolving payloads.
fn ordered_links(conn: &Connection, event_id: Uuid) -> Result<Vec<EventAction>> {
    let mut by_previous = index_by_previous(event_id, event_actions::get_by_event_in(conn, event_id)?);
    let mut ordered = Vec::with_capacity(by_previous.len());
    let mut cursor = SENTINEL_ID;
    while let Some(link) = by_previous.remove(&cursor) {
        cursor = link.id;
        ordered.push(link);
    }
    if !by_previous.is_empty() {
        warn!(%event_id, unreachable = by_previous.len(), "links not reachable from the chain head");
    }
    Ok(ordered)
}
