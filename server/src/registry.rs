//! Global entity registries
//!
//! [`PlayerManager`] tracks every logged-in player: it allocates session ids,
//! keeps account ids stable per display name, enforces the capacity limit and
//! tears players down through their logout hook before dropping them.
//! [`NpcManager`] does the same bookkeeping for NPCs.

use crate::config::ServerConfig;
use crate::dispatcher::CommandRegistry;
use crate::error::ServerError;
use crate::npc::Npc;
use crate::player::Player;
use crate::transport::Transport;
use log::info;
use shared::{AccountId, Location, NpcId, ServerPacket, SessionId};
use std::collections::HashMap;
use std::sync::Arc;

const MAX_DISPLAY_NAME_LENGTH: usize = 12;

pub struct PlayerManager {
    /// Logged-in players indexed by session
    players: HashMap<SessionId, Player>,
    /// Next session id handed out on login
    next_session_id: SessionId,
    /// Account ids survive logouts for the lifetime of the process
    accounts: HashMap<String, AccountId>,
    next_account_id: AccountId,
    max_players: usize,
}

impl PlayerManager {
    pub fn new(max_players: usize) -> Self {
        Self {
            players: HashMap::new(),
            next_session_id: 1,
            accounts: HashMap::new(),
            next_account_id: 1,
            max_players,
        }
    }

    /// Creates and logs in a player for a completed handshake
    ///
    /// The client learns its identifiers before the login hook runs, so the
    /// welcome notice always follows the acceptance.
    pub fn register(
        &mut self,
        display_name: &str,
        transport: Arc<dyn Transport>,
        handlers: Arc<CommandRegistry>,
        config: Arc<ServerConfig>,
        now: u64,
    ) -> Result<SessionId, ServerError> {
        let display_name = display_name.trim();
        if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
            return Err(ServerError::InvalidDisplayName);
        }
        if self.players.len() >= self.max_players {
            return Err(ServerError::ServerFull);
        }
        if self.find_by_name(display_name).is_some() {
            return Err(ServerError::AlreadyOnline(display_name.to_string()));
        }

        let account_id = self.account_id_for(display_name);
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        transport.send(ServerPacket::LoginAccepted {
            session_id,
            account_id,
        });

        let mut player = Player::new(
            session_id,
            account_id,
            display_name.to_string(),
            transport,
            handlers,
            config,
            now,
        );
        player.execute_login();

        info!(
            "Player {} logged in (account {}, session {})",
            display_name, account_id, session_id
        );
        self.players.insert(session_id, player);
        Ok(session_id)
    }

    /// Runs the logout hook and then drops the player
    ///
    /// Returns the removed player, or None if the session was already gone.
    pub fn unregister(&mut self, session_id: SessionId, npcs: &mut NpcManager) -> Option<Player> {
        let player = self.players.get_mut(&session_id)?;
        player.execute_logout(npcs);

        let player = self.players.remove(&session_id)?;
        info!(
            "Player {} logged out (session {})",
            player.display_name(),
            session_id
        );
        Some(player)
    }

    fn account_id_for(&mut self, display_name: &str) -> AccountId {
        let key = display_name.to_lowercase();
        if let Some(account_id) = self.accounts.get(&key) {
            return *account_id;
        }
        let account_id = self.next_account_id;
        self.next_account_id += 1;
        self.accounts.insert(key, account_id);
        account_id
    }

    pub fn find_by_name(&self, display_name: &str) -> Option<SessionId> {
        self.players
            .iter()
            .find(|(_, player)| player.display_name().eq_ignore_ascii_case(display_name))
            .map(|(id, _)| *id)
    }

    pub fn get(&self, session_id: SessionId) -> Option<&Player> {
        self.players.get(&session_id)
    }

    pub fn get_mut(&mut self, session_id: SessionId) -> Option<&mut Player> {
        self.players.get_mut(&session_id)
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.players.contains_key(&session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.players.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

pub struct NpcManager {
    npcs: HashMap<NpcId, Npc>,
    next_npc_id: NpcId,
}

impl NpcManager {
    pub fn new() -> Self {
        Self {
            npcs: HashMap::new(),
            next_npc_id: 1,
        }
    }

    /// Registers a new NPC at `spawn` and returns its id
    pub fn spawn(&mut self, name: &str, spawn: Location, wander_radius: i32) -> NpcId {
        let npc_id = self.next_npc_id;
        self.next_npc_id += 1;
        self.npcs
            .insert(npc_id, Npc::new(npc_id, name, spawn, wander_radius));
        npc_id
    }

    /// Removes an NPC. Unknown ids are ignored.
    pub fn unregister(&mut self, npc_id: NpcId) -> Option<Npc> {
        let npc = self.npcs.remove(&npc_id)?;
        info!("Unregistered npc {} ({})", npc.name(), npc_id);
        Some(npc)
    }

    pub fn get(&self, npc_id: NpcId) -> Option<&Npc> {
        self.npcs.get(&npc_id)
    }

    pub fn get_mut(&mut self, npc_id: NpcId) -> Option<&mut Npc> {
        self.npcs.get_mut(&npc_id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Npc> {
        self.npcs.values_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Npc> {
        self.npcs.values()
    }

    pub fn len(&self) -> usize {
        self.npcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.npcs.is_empty()
    }
}

impl Default for NpcManager {
    fn default() -> Self {
        Self::new()
    }
}
