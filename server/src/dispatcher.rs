//! Command dispatch
//!
//! [`CommandRegistry`] maps opcodes to handlers and is shared by every player.
//! Each player owns a [`Dispatcher`] that runs commands against it and sends
//! outbound notices through its transport. A failing or unknown command is
//! logged and skipped so the rest of the drained batch still runs.

use crate::entity::WorldRequests;
use crate::error::CommandError;
use crate::handlers;
use crate::player::Player;
use crate::transport::Transport;
use log::warn;
use shared::{Command, ServerPacket};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub trait CommandHandler: Send + Sync {
    fn handle(
        &self,
        player: &mut Player,
        command: &Command,
        now: u64,
        requests: &mut WorldRequests,
    ) -> Result<(), CommandError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&mut Player, &Command, u64, &mut WorldRequests) -> Result<(), CommandError>
        + Send
        + Sync,
{
    fn handle(
        &self,
        player: &mut Player,
        command: &Command,
        now: u64,
        requests: &mut WorldRequests,
    ) -> Result<(), CommandError> {
        self(player, command, now, requests)
    }
}

/// Opcode to handler table
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<u8, Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Creates a registry with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in handlers installed
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        handlers::register_defaults(&mut registry);
        registry
    }

    /// Installs a handler, returning the one it replaced
    pub fn register(
        &mut self,
        opcode: u8,
        handler: impl CommandHandler + 'static,
    ) -> Option<Box<dyn CommandHandler>> {
        self.handlers.insert(opcode, Box::new(handler))
    }

    pub fn get(&self, opcode: u8) -> Option<&dyn CommandHandler> {
        self.handlers.get(&opcode).map(|handler| handler.as_ref())
    }

    pub fn contains(&self, opcode: u8) -> bool {
        self.handlers.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut opcodes: Vec<_> = self.handlers.keys().copied().collect();
        opcodes.sort_unstable();
        f.debug_struct("CommandRegistry")
            .field("opcodes", &opcodes)
            .finish()
    }
}

/// Per-player dispatcher, bound to the player's transport
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Runs `command` against `owner`
    ///
    /// Returns true when a handler ran to completion. Unknown opcodes and
    /// handler errors are logged and reported as false.
    pub fn execute(
        &self,
        owner: &mut Player,
        command: &Command,
        now: u64,
        requests: &mut WorldRequests,
    ) -> bool {
        let opcode = command.opcode();
        let Some(handler) = self.registry.get(opcode) else {
            warn!("[{}] Unhandled opcode {}", owner.display_name(), opcode);
            return false;
        };

        match handler.handle(owner, command, now, requests) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "[{}] Failed to execute opcode {}: {}",
                    owner.display_name(),
                    opcode,
                    e
                );
                false
            }
        }
    }

    pub fn send_game_message(&self, text: impl Into<String>) {
        self.transport
            .send(ServerPacket::GameMessage { text: text.into() });
    }

    pub fn send(&self, packet: ServerPacket) {
        self.transport.send(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::transport::RecordingTransport;
    use shared::OPCODE_CHAT;

    fn test_player(registry: CommandRegistry) -> (Player, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let player = Player::new(
            1,
            100,
            "tester".to_string(),
            transport.clone(),
            Arc::new(registry),
            Arc::new(ServerConfig::default()),
            0,
        );
        (player, transport)
    }

    #[test]
    fn test_registry_register_and_replace() {
        let mut registry = CommandRegistry::new();
        assert!(registry.is_empty());

        let ok = |_: &mut Player,
                  _: &Command,
                  _: u64,
                  _: &mut WorldRequests|
         -> Result<(), CommandError> { Ok(()) };
        assert!(registry.register(7, ok).is_none());
        assert!(registry.register(7, ok).is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(7));
        assert!(!registry.contains(8));
    }

    #[test]
    fn test_default_registry_covers_builtin_opcodes() {
        let registry = CommandRegistry::with_default_handlers();
        for opcode in 0..=4 {
            assert!(registry.contains(opcode), "missing opcode {}", opcode);
        }
    }

    #[test]
    fn test_unknown_opcode_is_skipped() {
        let (mut player, _) = test_player(CommandRegistry::new());
        let dispatcher = player.dispatcher().clone();
        let mut requests = WorldRequests::new();

        let executed = dispatcher.execute(
            &mut player,
            &Command::Unsupported { opcode: 250 },
            0,
            &mut requests,
        );
        assert!(!executed);
        assert!(requests.is_empty());
    }

    #[test]
    fn test_handler_error_is_contained() {
        let mut registry = CommandRegistry::new();
        registry.register(
            OPCODE_CHAT,
            |_: &mut Player,
             _: &Command,
             _: u64,
             _: &mut WorldRequests|
             -> Result<(), CommandError> {
                Err(CommandError::InvalidState("always fails".to_string()))
            },
        );
        let (mut player, _) = test_player(registry);
        let dispatcher = player.dispatcher().clone();
        let mut requests = WorldRequests::new();

        let executed = dispatcher.execute(
            &mut player,
            &Command::Chat {
                message: "hi".to_string(),
            },
            0,
            &mut requests,
        );
        assert!(!executed);
    }

    #[test]
    fn test_send_game_message_goes_through_transport() {
        let (player, transport) = test_player(CommandRegistry::new());
        player.dispatcher().send_game_message("hello there");
        assert_eq!(transport.game_messages(), vec!["hello there".to_string()]);
    }
}
