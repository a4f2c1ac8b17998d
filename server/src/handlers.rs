//! Built-in command handlers
//!
//! These cover the session plumbing the tick loop needs (heartbeat, logout)
//! plus a few small actions that exercise movement and broadcasting.

use crate::dispatcher::{CommandHandler, CommandRegistry};
use crate::entity::WorldRequests;
use crate::error::CommandError;
use crate::player::{Player, QueuedAction};
use shared::{
    Command, Location, OPCODE_CHAT, OPCODE_HEARTBEAT, OPCODE_LOGOUT, OPCODE_WALK, OPCODE_YELL,
    YELL_COOLDOWN_MS,
};

const MAX_MESSAGE_LENGTH: usize = 80;

pub fn register_defaults(registry: &mut CommandRegistry) {
    registry.register(OPCODE_HEARTBEAT, HeartbeatHandler);
    registry.register(OPCODE_WALK, WalkHandler);
    registry.register(OPCODE_CHAT, ChatHandler);
    registry.register(OPCODE_YELL, YellHandler);
    registry.register(OPCODE_LOGOUT, LogoutHandler);
}

/// Keep-alive; receiving it is enough to reset the idle timer
pub struct HeartbeatHandler;

impl CommandHandler for HeartbeatHandler {
    fn handle(
        &self,
        _player: &mut Player,
        _command: &Command,
        _now: u64,
        _requests: &mut WorldRequests,
    ) -> Result<(), CommandError> {
        Ok(())
    }
}

/// Replaces the queued action with a walk towards the requested tile
pub struct WalkHandler;

impl CommandHandler for WalkHandler {
    fn handle(
        &self,
        player: &mut Player,
        command: &Command,
        _now: u64,
        _requests: &mut WorldRequests,
    ) -> Result<(), CommandError> {
        let Command::Walk { x, z } = command else {
            return Err(CommandError::InvalidArgument(format!(
                "expected walk, got {:?}",
                command
            )));
        };

        let target = Location::new(*x, *z);
        if player.location().distance(&target) >= player.interaction_distance() {
            return Err(CommandError::InvalidArgument(format!(
                "walk target ({}, {}) is out of reach",
                x, z
            )));
        }

        player.interrupt();
        if target != player.location() {
            player.set_queued_action(QueuedAction::Walk { target });
        }
        Ok(())
    }
}

/// Local chat, heard by the sender and every player it can see
pub struct ChatHandler;

impl CommandHandler for ChatHandler {
    fn handle(
        &self,
        player: &mut Player,
        command: &Command,
        _now: u64,
        requests: &mut WorldRequests,
    ) -> Result<(), CommandError> {
        let Command::Chat { message } = command else {
            return Err(CommandError::InvalidArgument(format!(
                "expected chat, got {:?}",
                command
            )));
        };
        if player.is_muted() {
            return Err(CommandError::Muted);
        }
        let message = validate_message(message)?;

        let mut audience: Vec<_> = player.local_players().iter().copied().collect();
        audience.push(player.session_id());
        requests.broadcast_to(audience, format!("{}: {}", player.display_name(), message));
        Ok(())
    }
}

/// Global chat, rate limited for regular accounts
pub struct YellHandler;

impl CommandHandler for YellHandler {
    fn handle(
        &self,
        player: &mut Player,
        command: &Command,
        now: u64,
        requests: &mut WorldRequests,
    ) -> Result<(), CommandError> {
        let Command::Yell { message } = command else {
            return Err(CommandError::InvalidArgument(format!(
                "expected yell, got {:?}",
                command
            )));
        };
        if player.is_muted() {
            return Err(CommandError::Muted);
        }
        let message = validate_message(message)?;

        if player.has_yell_throttle(now) {
            player.dispatcher().send_game_message(format!(
                "You can only yell once every {} seconds.",
                YELL_COOLDOWN_MS / 1000
            ));
            return Err(CommandError::Throttled);
        }

        requests.broadcast_all(format!("[{}]: {}", player.display_name(), message));
        Ok(())
    }
}

pub struct LogoutHandler;

impl CommandHandler for LogoutHandler {
    fn handle(
        &self,
        player: &mut Player,
        _command: &Command,
        _now: u64,
        requests: &mut WorldRequests,
    ) -> Result<(), CommandError> {
        player.request_logout(requests);
        Ok(())
    }
}

fn validate_message(message: &str) -> Result<&str, CommandError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(CommandError::InvalidArgument("empty message".to_string()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(CommandError::InvalidArgument(format!(
            "message longer than {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(trimmed)
}
