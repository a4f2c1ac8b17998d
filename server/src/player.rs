//! Connected player state and its per-tick behaviour
//!
//! A player is advanced once per tick in a fixed order:
//! 1. local-interest reconciliation against the tick snapshot
//! 2. drain and execute every queued command, then advance the queued action
//! 3. idle check, which may request a logout and end the tick early
//!
//! Everything here runs on the scheduler task. The only piece touched by the
//! network layer is the intake queue, through a [`CommandSender`].

use crate::account::{GameMode, Privilege};
use crate::config::ServerConfig;
use crate::dispatcher::{CommandRegistry, Dispatcher};
use crate::entity::{Entity, EntityKey, WorldRequests, WorldSnapshot};
use crate::intake::{CommandSender, IntakeQueue};
use crate::registry::NpcManager;
use crate::transport::Transport;
use crate::visibility::LocalInterest;
use log::{debug, info};
use shared::{
    AccountId, Location, NpcId, ServerPacket, SessionId, WELCOME_MESSAGE, YELL_COOLDOWN_MS,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Connected,
    /// Logout requested; the registry tears the player down after the tick
    LoggingOut,
    LoggedOut,
}

/// A multi-tick action that continues without further input
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedAction {
    Walk { target: Location },
}

#[derive(Debug)]
pub struct Player {
    /// Permanent account identifier
    account_id: AccountId,
    /// Identifier for this login only
    session_id: SessionId,
    display_name: String,
    privilege: Privilege,
    game_mode: GameMode,
    muted: bool,

    location: Location,
    needs_full_redraw: bool,
    state: PlayerState,
    logged_in: bool,

    transport: Arc<dyn Transport>,
    intake: IntakeQueue,
    dispatcher: Dispatcher,
    config: Arc<ServerConfig>,

    /// Receive time of the newest executed command
    last_command_received: u64,
    last_yell_time: Option<u64>,

    local_players: LocalInterest<SessionId>,
    local_npcs: LocalInterest<NpcId>,

    queued_action: Option<QueuedAction>,
    familiar: Option<NpcId>,
}

impl Player {
    pub fn new(
        session_id: SessionId,
        account_id: AccountId,
        display_name: String,
        transport: Arc<dyn Transport>,
        registry: Arc<CommandRegistry>,
        config: Arc<ServerConfig>,
        now: u64,
    ) -> Self {
        transport.attach(session_id);
        let dispatcher = Dispatcher::new(registry, Arc::clone(&transport));

        Self {
            account_id,
            session_id,
            display_name,
            privilege: Privilege::default(),
            game_mode: GameMode::default(),
            muted: false,
            location: config.spawn_location,
            needs_full_redraw: false,
            state: PlayerState::Connected,
            logged_in: false,
            transport,
            intake: IntakeQueue::new(),
            dispatcher,
            config,
            last_command_received: now,
            last_yell_time: None,
            local_players: LocalInterest::new(),
            local_npcs: LocalInterest::new(),
            queued_action: None,
            familiar: None,
        }
    }

    /// Places the player in the world and greets it. Runs once per login.
    pub fn execute_login(&mut self) {
        if self.logged_in {
            debug!("[{}] Login already executed", self.display_name);
            return;
        }
        self.logged_in = true;

        self.location = self.config.spawn_location;
        self.set_travel_back();
        self.dispatcher.send_game_message(WELCOME_MESSAGE);
    }

    /// Releases everything the player holds
    ///
    /// Queued commands are discarded, the queued action is cancelled, the
    /// familiar goes back to the NPC registry and the connection is closed.
    /// Only the first call does anything; returns whether this call did.
    pub fn execute_logout(&mut self, npcs: &mut NpcManager) -> bool {
        if self.state == PlayerState::LoggedOut {
            return false;
        }

        self.intake.close();
        let discarded = self.intake.clear();
        if discarded > 0 {
            debug!(
                "[{}] Discarded {} queued commands on logout",
                self.display_name, discarded
            );
        }

        self.interrupt();

        if let Some(familiar) = self.familiar.take() {
            npcs.unregister(familiar);
        }

        if self.transport.is_connected() {
            self.transport.disconnect();
        }

        self.local_players.clear();
        self.local_npcs.clear();
        self.state = PlayerState::LoggedOut;
        true
    }

    /// Moves the player to `LoggingOut` and asks the registry to finish the job
    ///
    /// Repeated calls issue no further requests.
    pub fn request_logout(&mut self, requests: &mut WorldRequests) {
        if self.state != PlayerState::Connected {
            return;
        }
        self.state = PlayerState::LoggingOut;
        requests.queue_logout(self.session_id);
    }

    /// Cancels the in-progress queued action, if any
    pub fn interrupt(&mut self) {
        self.queued_action = None;
    }

    /// Checks and updates the yell cooldown
    ///
    /// Returns false when the player may yell now. The first yell of a
    /// session always goes through, and staff are never throttled.
    pub fn has_yell_throttle(&mut self, now: u64) -> bool {
        if self.privilege.is_developer() || self.privilege.is_moderator() {
            return false;
        }
        let cooled_down = self
            .last_yell_time
            .map_or(true, |last| now.saturating_sub(last) > YELL_COOLDOWN_MS);
        if cooled_down {
            self.last_yell_time = Some(now);
            return false;
        }
        true
    }

    fn update_local_lists(&mut self, world: &WorldSnapshot) {
        let distance = self.config.interaction_distance;
        let players =
            self.local_players
                .reconcile(&self.location, Some(self.session_id), &world.players, distance);
        let npcs = self
            .local_npcs
            .reconcile(&self.location, None, &world.npcs, distance);

        if players.is_empty() && npcs.is_empty() && !self.needs_full_redraw {
            return;
        }
        self.needs_full_redraw = false;

        self.dispatcher.send(ServerPacket::InterestUpdate {
            added_players: players.added,
            removed_players: players.removed,
            added_npcs: npcs.added,
            removed_npcs: npcs.removed,
        });
    }

    fn execute_queued_commands(&mut self, now: u64, requests: &mut WorldRequests) {
        let dispatcher = self.dispatcher.clone();
        for queued in self.intake.drain_all() {
            self.last_command_received = self.last_command_received.max(queued.received_at);
            dispatcher.execute(self, &queued.command, now, requests);
        }
    }

    fn advance_queued_action(&mut self) {
        match self.queued_action {
            Some(QueuedAction::Walk { target }) => {
                self.location = self.location.step_towards(&target);
                if self.location == target {
                    self.queued_action = None;
                }
            }
            None => {}
        }
    }

    fn is_idle(&self, now: u64) -> bool {
        now.saturating_sub(self.last_command_received) > self.config.idle_threshold_millis()
    }

    /// Flags the client view for a full refresh on the next tick
    fn set_travel_back(&mut self) {
        self.needs_full_redraw = true;
    }

    /// Producer handle for the network layer
    pub fn command_sender(&self) -> CommandSender {
        self.intake.sender()
    }

    pub fn pending_commands(&self) -> usize {
        self.intake.len()
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    pub fn set_privilege(&mut self, privilege: Privilege) {
        self.privilege = privilege;
    }

    pub fn is_developer(&self) -> bool {
        self.privilege.is_developer()
    }

    pub fn is_moderator(&self) -> bool {
        self.privilege.is_moderator()
    }

    pub fn game_mode(&self) -> GameMode {
        self.game_mode
    }

    pub fn set_game_mode(&mut self, game_mode: GameMode) {
        self.game_mode = game_mode;
    }

    /// True if chat privileges are suspended
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn interaction_distance(&self) -> f32 {
        self.config.interaction_distance
    }

    pub fn last_command_received(&self) -> u64 {
        self.last_command_received
    }

    pub fn local_players(&self) -> &LocalInterest<SessionId> {
        &self.local_players
    }

    pub fn local_npcs(&self) -> &LocalInterest<NpcId> {
        &self.local_npcs
    }

    pub fn queued_action(&self) -> Option<&QueuedAction> {
        self.queued_action.as_ref()
    }

    pub fn set_queued_action(&mut self, action: QueuedAction) {
        self.queued_action = Some(action);
    }

    pub fn familiar(&self) -> Option<NpcId> {
        self.familiar
    }

    /// Attaches a familiar, returning the one it replaces
    pub fn set_familiar(&mut self, npc_id: NpcId) -> Option<NpcId> {
        self.familiar.replace(npc_id)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl Entity for Player {
    fn key(&self) -> EntityKey {
        EntityKey::Player(self.session_id)
    }

    fn location(&self) -> Location {
        self.location
    }

    /// Players do not die at this layer
    fn is_dead(&self) -> bool {
        false
    }

    fn tick(&mut self, now: u64, world: &WorldSnapshot, requests: &mut WorldRequests) {
        if self.state != PlayerState::Connected {
            return;
        }

        self.update_local_lists(world);

        self.execute_queued_commands(now, requests);
        self.advance_queued_action();

        // Idle logout timer.
        if self.state == PlayerState::Connected && self.is_idle(now) {
            info!("[{}] Disconnected - Idle logout.", self.display_name);
            self.request_logout(requests);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;
    use shared::Command;
    use std::collections::HashMap;

    const IDLE_MINUTES: u64 = 5;
    const IDLE_MS: u64 = IDLE_MINUTES * 60_000;

    fn test_config() -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            idle_disconnect_minutes: IDLE_MINUTES,
            interaction_distance: 10.0,
            spawn_location: Location::new(0, 0),
            ..ServerConfig::default()
        })
    }

    fn new_player(
        session_id: SessionId,
        registry: CommandRegistry,
        now: u64,
    ) -> (Player, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let mut player = Player::new(
            session_id,
            session_id + 1000,
            format!("player{}", session_id),
            transport.clone(),
            Arc::new(registry),
            test_config(),
            now,
        );
        player.execute_login();
        (player, transport)
    }

    fn counting_registry(counter: Arc<std::sync::atomic::AtomicUsize>) -> CommandRegistry {
        use std::sync::atomic::Ordering;

        let mut registry = CommandRegistry::with_default_handlers();
        registry.register(
            shared::OPCODE_HEARTBEAT,
            move |_: &mut Player,
                  _: &Command,
                  _: u64,
                  _: &mut WorldRequests|
                  -> Result<(), crate::error::CommandError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );
        registry
    }

    #[test]
    fn test_login_places_player_and_greets() {
        let (player, transport) = new_player(1, CommandRegistry::new(), 0);

        assert_eq!(player.location(), Location::new(0, 0));
        assert_eq!(transport.game_messages(), vec![WELCOME_MESSAGE.to_string()]);
        assert_eq!(transport.attachment(), Some(1));
        assert_eq!(player.account_id(), 1001);
    }

    #[test]
    fn test_login_runs_once() {
        let (mut player, transport) = new_player(1, CommandRegistry::new(), 0);
        player.execute_login();
        assert_eq!(transport.game_messages().len(), 1);
    }

    #[test]
    fn test_first_tick_sends_full_interest_update() {
        let (mut player, transport) = new_player(1, CommandRegistry::new(), 0);
        let mut requests = WorldRequests::new();

        player.tick(1, &WorldSnapshot::default(), &mut requests);
        player.tick(2, &WorldSnapshot::default(), &mut requests);

        let updates = transport
            .sent_packets()
            .into_iter()
            .filter(|packet| matches!(packet, ServerPacket::InterestUpdate { .. }))
            .count();
        assert_eq!(updates, 1);
    }

    #[test]
    fn test_tick_builds_local_lists() {
        let (mut player, _) = new_player(1, CommandRegistry::new(), 0);
        let world = WorldSnapshot {
            players: HashMap::from([
                (1, Location::new(0, 0)),
                (2, Location::new(5, 0)),
                (3, Location::new(50, 0)),
            ]),
            npcs: HashMap::from([(10, Location::new(0, 9)), (11, Location::new(0, 10))]),
        };

        player.tick(1, &world, &mut WorldRequests::new());

        assert!(player.local_players().contains(&2));
        assert!(!player.local_players().contains(&1));
        assert!(!player.local_players().contains(&3));
        assert!(player.local_npcs().contains(&10));
        assert!(!player.local_npcs().contains(&11));
    }

    #[test]
    fn test_tick_drains_every_queued_command() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (mut player, _) = new_player(1, counting_registry(counter.clone()), 0);
        let sender = player.command_sender();

        for i in 0..5 {
            sender.enqueue(Command::Heartbeat, i);
        }
        player.tick(10, &WorldSnapshot::default(), &mut WorldRequests::new());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 5);
        assert_eq!(player.pending_commands(), 0);

        player.tick(20, &WorldSnapshot::default(), &mut WorldRequests::new());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[test]
    fn test_bad_command_does_not_abort_batch() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (mut player, _) = new_player(1, counting_registry(counter.clone()), 0);
        let sender = player.command_sender();

        sender.enqueue(Command::Heartbeat, 1);
        sender.enqueue(Command::Unsupported { opcode: 99 }, 2);
        sender.enqueue(
            Command::Walk {
                x: 10_000,
                z: 10_000,
            },
            3,
        );
        sender.enqueue(Command::Heartbeat, 4);

        player.tick(5, &WorldSnapshot::default(), &mut WorldRequests::new());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(player.last_command_received(), 4);
    }

    #[test]
    fn test_idle_before_threshold_stays_connected() {
        let start = 1_000;
        let (mut player, _) = new_player(1, CommandRegistry::new(), start);
        let mut requests = WorldRequests::new();

        player.tick(start + IDLE_MS - 1, &WorldSnapshot::default(), &mut requests);
        assert_eq!(player.state(), PlayerState::Connected);
        assert!(requests.logouts().is_empty());

        player.tick(start + IDLE_MS, &WorldSnapshot::default(), &mut requests);
        assert_eq!(player.state(), PlayerState::Connected);
    }

    #[test]
    fn test_idle_after_threshold_requests_one_logout() {
        let start = 1_000;
        let (mut player, _) = new_player(1, CommandRegistry::new(), start);
        let mut requests = WorldRequests::new();

        player.tick(start + IDLE_MS + 1, &WorldSnapshot::default(), &mut requests);
        assert_eq!(player.state(), PlayerState::LoggingOut);
        assert_eq!(requests.logouts(), &[1]);

        // No further processing once logging out.
        let world = WorldSnapshot {
            players: HashMap::from([(2, Location::new(1, 1))]),
            npcs: HashMap::new(),
        };
        player.tick(start + IDLE_MS + 2, &world, &mut requests);
        assert_eq!(requests.logouts(), &[1]);
        assert!(player.local_players().is_empty());
    }

    #[test]
    fn test_command_in_expiry_tick_runs_before_idle_check() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let start = 1_000;
        let (mut player, _) = new_player(1, counting_registry(counter.clone()), start);
        let mut requests = WorldRequests::new();

        // The command arrived before expiry but is drained in the expiry tick.
        player
            .command_sender()
            .enqueue(Command::Heartbeat, start + IDLE_MS - 10);
        player.tick(start + IDLE_MS + 1, &WorldSnapshot::default(), &mut requests);

        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(player.state(), PlayerState::Connected);
        assert!(requests.logouts().is_empty());
    }

    #[test]
    fn test_stale_command_executes_then_idle_logout_fires() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let start = 1_000;
        let (mut player, _) = new_player(1, counting_registry(counter.clone()), start);
        let mut requests = WorldRequests::new();

        player.command_sender().enqueue(Command::Heartbeat, start);
        player.tick(start + IDLE_MS + 1, &WorldSnapshot::default(), &mut requests);

        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(requests.logouts(), &[1]);
    }

    #[test]
    fn test_walk_advances_one_tile_per_tick() {
        let (mut player, _) = new_player(1, CommandRegistry::with_default_handlers(), 0);
        player.command_sender().enqueue(Command::Walk { x: 3, z: 0 }, 1);

        let world = WorldSnapshot::default();
        player.tick(1, &world, &mut WorldRequests::new());
        assert_eq!(player.location(), Location::new(1, 0));
        player.tick(2, &world, &mut WorldRequests::new());
        player.tick(3, &world, &mut WorldRequests::new());
        assert_eq!(player.location(), Location::new(3, 0));
        assert!(player.queued_action().is_none());
    }

    #[test]
    fn test_logout_discards_queued_commands() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (mut player, transport) = new_player(1, counting_registry(counter.clone()), 0);
        let sender = player.command_sender();
        let mut npcs = NpcManager::new();

        sender.enqueue(Command::Heartbeat, 1);
        sender.enqueue(Command::Heartbeat, 2);
        assert!(player.execute_logout(&mut npcs));

        assert!(!sender.enqueue(Command::Heartbeat, 3));
        player.tick(4, &WorldSnapshot::default(), &mut WorldRequests::new());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(player.pending_commands(), 0);
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_logout_is_idempotent() {
        let (mut player, transport) = new_player(1, CommandRegistry::new(), 0);
        let mut npcs = NpcManager::new();
        let familiar = npcs.spawn("Cat", Location::new(1, 0), 0);
        player.set_familiar(familiar);

        assert!(player.execute_logout(&mut npcs));
        assert!(!player.execute_logout(&mut npcs));

        assert_eq!(transport.disconnect_count(), 1);
        assert!(npcs.get(familiar).is_none());
        assert_eq!(player.state(), PlayerState::LoggedOut);
    }

    #[test]
    fn test_logout_tolerates_closed_transport() {
        let (mut player, transport) = new_player(1, CommandRegistry::new(), 0);
        transport.disconnect();

        assert!(player.execute_logout(&mut NpcManager::new()));
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[test]
    fn test_logout_cancels_queued_action() {
        let (mut player, _) = new_player(1, CommandRegistry::new(), 0);
        player.set_queued_action(QueuedAction::Walk {
            target: Location::new(5, 5),
        });

        player.execute_logout(&mut NpcManager::new());
        assert!(player.queued_action().is_none());
    }

    #[test]
    fn test_first_yell_is_never_throttled() {
        let (mut player, _) = new_player(1, CommandRegistry::new(), 0);

        assert!(!player.has_yell_throttle(1_000));
        assert!(player.has_yell_throttle(1_000 + YELL_COOLDOWN_MS));
        assert!(!player.has_yell_throttle(1_001 + YELL_COOLDOWN_MS));
    }

    #[test]
    fn test_request_logout_only_once() {
        let (mut player, _) = new_player(1, CommandRegistry::new(), 0);
        let mut requests = WorldRequests::new();

        player.request_logout(&mut requests);
        player.request_logout(&mut requests);
        assert_eq!(requests.logouts(), &[1]);
    }
}
