use crate::entity::{Entity, EntityKey, WorldRequests, WorldSnapshot};
use log::debug;
use rand::Rng;
use shared::{Location, NpcId, SessionId};

/// Milliseconds between two wander steps
const WANDER_INTERVAL_MS: u64 = 3_000;
/// Familiars stop following once they are this close to their owner
const FOLLOW_DISTANCE: f32 = 1.5;

#[derive(Debug, Clone)]
pub struct Npc {
    id: NpcId,
    name: String,
    location: Location,
    spawn: Location,
    /// Maximum tile offset from `spawn` on either axis; zero keeps it still
    wander_radius: i32,
    owner: Option<SessionId>,
    hits: u32,
    last_wander: u64,
}

impl Npc {
    pub fn new(id: NpcId, name: impl Into<String>, spawn: Location, wander_radius: i32) -> Self {
        Self {
            id,
            name: name.into(),
            location: spawn,
            spawn,
            wander_radius: wander_radius.max(0),
            owner: None,
            hits: 10,
            last_wander: 0,
        }
    }

    pub fn id(&self) -> NpcId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn spawn(&self) -> Location {
        self.spawn
    }

    pub fn owner(&self) -> Option<SessionId> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: Option<SessionId>) {
        self.owner = owner;
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn set_hits(&mut self, hits: u32) {
        self.hits = hits;
    }

    fn follow(&mut self, owner: SessionId, world: &WorldSnapshot, requests: &mut WorldRequests) {
        match world.players.get(&owner) {
            Some(target) => {
                if self.location.distance(target) > FOLLOW_DISTANCE {
                    self.location = self.location.step_towards(target);
                }
            }
            None => {
                debug!("Familiar {} lost its owner {}", self.id, owner);
                requests.unregister_npc(self.id);
            }
        }
    }

    fn wander(&mut self, now: u64) {
        if self.wander_radius == 0 || now.saturating_sub(self.last_wander) < WANDER_INTERVAL_MS {
            return;
        }
        self.last_wander = now;

        let mut rng = rand::thread_rng();
        let r = self.wander_radius;
        let target = Location::new(
            self.spawn.x + rng.gen_range(-r..=r),
            self.spawn.z + rng.gen_range(-r..=r),
        );
        self.location = self.location.step_towards(&target);
    }
}

impl Entity for Npc {
    fn key(&self) -> EntityKey {
        EntityKey::Npc(self.id)
    }

    fn location(&self) -> Location {
        self.location
    }

    fn is_dead(&self) -> bool {
        self.hits == 0
    }

    fn tick(&mut self, now: u64, world: &WorldSnapshot, requests: &mut WorldRequests) {
        match self.owner {
            Some(owner) => self.follow(owner, world, requests),
            None => self.wander(now),
        }
    }
}
