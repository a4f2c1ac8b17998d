//! Authoritative world state and the per-tick scheduler pass
//!
//! Registry mutations never happen while entities are being iterated. A tick
//! first applies logouts requested from outside (network disconnects), then
//! freezes every entity location into a [`WorldSnapshot`], advances players and
//! NPCs against that snapshot, and finally applies whatever the pass asked for.

use crate::config::ServerConfig;
use crate::dispatcher::CommandRegistry;
use crate::entity::{run_tick_pass, Audience, Broadcast, Entity, WorldRequests, WorldSnapshot};
use crate::error::ServerError;
use crate::registry::{NpcManager, PlayerManager};
use crate::transport::Transport;
use log::debug;
use shared::{Location, NpcId, SessionId};
use std::sync::Arc;

/// Summary of one scheduler pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub tick: u64,
    pub entities_ticked: usize,
    pub logouts: usize,
    pub npcs_removed: usize,
}

pub struct World {
    tick: u64,
    config: Arc<ServerConfig>,
    handlers: Arc<CommandRegistry>,
    players: PlayerManager,
    npcs: NpcManager,
    /// Logouts requested between ticks, applied before the next pass
    pending_logouts: Vec<SessionId>,
}

impl World {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_handlers(config, CommandRegistry::with_default_handlers())
    }

    pub fn with_handlers(config: ServerConfig, handlers: CommandRegistry) -> Self {
        let max_players = config.max_players;
        Self {
            tick: 0,
            config: Arc::new(config),
            handlers: Arc::new(handlers),
            players: PlayerManager::new(max_players),
            npcs: NpcManager::new(),
            pending_logouts: Vec::new(),
        }
    }

    /// Registers and logs in a player whose handshake just completed
    pub fn login(
        &mut self,
        display_name: &str,
        transport: Arc<dyn Transport>,
        now: u64,
    ) -> Result<SessionId, ServerError> {
        self.players.register(
            display_name,
            transport,
            Arc::clone(&self.handlers),
            Arc::clone(&self.config),
            now,
        )
    }

    /// Schedules a logout that is applied at the start of the next tick
    pub fn queue_logout(&mut self, session_id: SessionId) {
        if !self.pending_logouts.contains(&session_id) {
            self.pending_logouts.push(session_id);
        }
    }

    pub fn spawn_npc(&mut self, name: &str, location: Location, wander_radius: i32) -> NpcId {
        self.npcs.spawn(name, location, wander_radius)
    }

    pub fn despawn_npc(&mut self, npc_id: NpcId) -> bool {
        self.npcs.unregister(npc_id).is_some()
    }

    /// Spawns a familiar next to a player and attaches it
    ///
    /// A previously attached familiar is released. Returns None if the
    /// session is not logged in.
    pub fn summon_familiar(&mut self, session_id: SessionId, name: &str) -> Option<NpcId> {
        let location = self.players.get(session_id)?.location();

        let npc_id = self.npcs.spawn(name, location, 0);
        if let Some(npc) = self.npcs.get_mut(npc_id) {
            npc.set_owner(Some(session_id));
        }

        let previous = match self.players.get_mut(session_id) {
            Some(player) => player.set_familiar(npc_id),
            None => None,
        };
        if let Some(previous) = previous {
            self.npcs.unregister(previous);
        }
        Some(npc_id)
    }

    /// Advances every live entity by one tick
    pub fn tick(&mut self, now: u64) -> TickReport {
        let mut report = TickReport::default();

        for session_id in std::mem::take(&mut self.pending_logouts) {
            if self.players.unregister(session_id, &mut self.npcs).is_some() {
                report.logouts += 1;
            }
        }

        let snapshot = WorldSnapshot::capture(
            self.players
                .iter()
                .map(|p| p as &dyn Entity)
                .chain(self.npcs.iter().map(|n| n as &dyn Entity)),
        );
        let mut requests = WorldRequests::new();

        report.entities_ticked += run_tick_pass(
            self.players.iter_mut().map(|p| p as &mut dyn Entity),
            now,
            &snapshot,
            &mut requests,
        );
        report.entities_ticked += run_tick_pass(
            self.npcs.iter_mut().map(|n| n as &mut dyn Entity),
            now,
            &snapshot,
            &mut requests,
        );

        let (logouts, npcs_removed) = self.apply_requests(requests);
        report.logouts += logouts;
        report.npcs_removed = npcs_removed;

        self.tick += 1;
        report.tick = self.tick;
        report
    }

    fn apply_requests(&mut self, requests: WorldRequests) -> (usize, usize) {
        let (logouts, npc_unregistrations, broadcasts) = requests.into_parts();

        for broadcast in broadcasts {
            self.deliver(broadcast);
        }

        let mut logged_out = 0;
        for session_id in logouts {
            if self.players.unregister(session_id, &mut self.npcs).is_some() {
                logged_out += 1;
            }
        }

        let mut removed = 0;
        for npc_id in npc_unregistrations {
            if self.npcs.unregister(npc_id).is_some() {
                removed += 1;
            }
        }

        (logged_out, removed)
    }

    fn deliver(&self, broadcast: Broadcast) {
        match broadcast.audience {
            Audience::Everyone => {
                for player in self.players.iter() {
                    player.dispatcher().send_game_message(broadcast.text.clone());
                }
            }
            Audience::Sessions(sessions) => {
                for session_id in sessions {
                    match self.players.get(session_id) {
                        Some(player) => player.dispatcher().send_game_message(broadcast.text.clone()),
                        None => debug!("Dropping message for departed session {}", session_id),
                    }
                }
            }
        }
    }

    /// Logs out every player, used on shutdown
    pub fn logout_all(&mut self) -> usize {
        let mut logged_out = 0;
        for session_id in self.players.session_ids() {
            if self.players.unregister(session_id, &mut self.npcs).is_some() {
                logged_out += 1;
            }
        }
        self.pending_logouts.clear();
        logged_out
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn players(&self) -> &PlayerManager {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut PlayerManager {
        &mut self.players
    }

    pub fn npcs(&self) -> &NpcManager {
        &self.npcs
    }

    pub fn npcs_mut(&mut self) -> &mut NpcManager {
        &mut self.npcs
    }
}
