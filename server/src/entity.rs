//! Scheduler-facing entity capability
//!
//! The world advances every registered entity once per tick through the
//! [`Entity`] trait and never looks at the concrete variant. Entities see the
//! world only through an immutable [`WorldSnapshot`] taken before the pass, and
//! anything that would mutate a registry is collected in [`WorldRequests`] and
//! applied after the pass has finished iterating.

use log::trace;
use shared::{Location, NpcId, SessionId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Player(SessionId),
    Npc(NpcId),
}

pub trait Entity {
    fn key(&self) -> EntityKey;

    fn location(&self) -> Location;

    fn is_dead(&self) -> bool;

    /// Advances the entity by one tick
    fn tick(&mut self, now: u64, world: &WorldSnapshot, requests: &mut WorldRequests);
}

/// Locations of every registered entity, frozen at the start of a tick
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    pub players: HashMap<SessionId, Location>,
    pub npcs: HashMap<NpcId, Location>,
}

impl WorldSnapshot {
    /// Records the current location of every entity, sorted by key kind
    pub fn capture<'a, I>(entities: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn Entity>,
    {
        let mut snapshot = Self::default();
        for entity in entities {
            match entity.key() {
                EntityKey::Player(session_id) => {
                    snapshot.players.insert(session_id, entity.location());
                }
                EntityKey::Npc(npc_id) => {
                    snapshot.npcs.insert(npc_id, entity.location());
                }
            }
        }
        snapshot
    }
}

/// Who receives a broadcast game message
#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    Everyone,
    Sessions(Vec<SessionId>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub audience: Audience,
    pub text: String,
}

/// Registry mutations raised while a tick pass is running
#[derive(Debug, Default)]
pub struct WorldRequests {
    logouts: Vec<SessionId>,
    npc_unregistrations: Vec<NpcId>,
    broadcasts: Vec<Broadcast>,
}

impl WorldRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the player registry to log this session out after the pass
    pub fn queue_logout(&mut self, session_id: SessionId) {
        if !self.logouts.contains(&session_id) {
            self.logouts.push(session_id);
        }
    }

    /// Asks the NPC registry to drop this NPC after the pass
    pub fn unregister_npc(&mut self, npc_id: NpcId) {
        if !self.npc_unregistrations.contains(&npc_id) {
            self.npc_unregistrations.push(npc_id);
        }
    }

    pub fn broadcast_all(&mut self, text: impl Into<String>) {
        self.broadcasts.push(Broadcast {
            audience: Audience::Everyone,
            text: text.into(),
        });
    }

    pub fn broadcast_to(&mut self, sessions: Vec<SessionId>, text: impl Into<String>) {
        if sessions.is_empty() {
            return;
        }
        self.broadcasts.push(Broadcast {
            audience: Audience::Sessions(sessions),
            text: text.into(),
        });
    }

    pub fn logouts(&self) -> &[SessionId] {
        &self.logouts
    }

    pub fn npc_unregistrations(&self) -> &[NpcId] {
        &self.npc_unregistrations
    }

    pub fn broadcasts(&self) -> &[Broadcast] {
        &self.broadcasts
    }

    pub fn is_empty(&self) -> bool {
        self.logouts.is_empty() && self.npc_unregistrations.is_empty() && self.broadcasts.is_empty()
    }

    /// Splits the collected requests so they can be applied one kind at a time
    pub fn into_parts(self) -> (Vec<SessionId>, Vec<NpcId>, Vec<Broadcast>) {
        (self.logouts, self.npc_unregistrations, self.broadcasts)
    }
}

/// Runs one tick for each live entity, in iteration order
///
/// Dead entities are skipped. Returns the number of entities ticked.
pub fn run_tick_pass<'a, I>(
    entities: I,
    now: u64,
    world: &WorldSnapshot,
    requests: &mut WorldRequests,
) -> usize
where
    I: IntoIterator<Item = &'a mut dyn Entity>,
{
    let mut ticked = 0;
    for entity in entities {
        if entity.is_dead() {
            trace!("Skipping dead entity {:?}", entity.key());
            continue;
        }
        entity.tick(now, world, requests);
        ticked += 1;
    }
    ticked
}
