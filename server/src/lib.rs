//! # Tick World Server Library
//!
//! Authoritative core of a tick-based multiplayer world. Players and NPCs live
//! in shared registries and are advanced by a single scheduler in fixed-length
//! ticks. Client commands are accepted concurrently by the network layer but
//! only ever executed on the tick.
//!
//! ## Core Responsibilities
//!
//! ### Command Intake
//! Each player owns an [`intake::IntakeQueue`]. The network receiver pushes
//! decoded commands into it from any task; the tick drains exactly the commands
//! present when the drain began and runs them in arrival order through the
//! [`dispatcher::Dispatcher`].
//!
//! ### Local Awareness
//! Every tick a player recomputes which players and NPCs are within the
//! interaction distance. [`visibility::LocalInterest`] marks newcomers and
//! schedules departures, then applies both in one reconcile pass so the set is
//! never half-updated while the client is being told about it.
//!
//! ### Lifecycle
//! Login and logout hooks are run by [`registry::PlayerManager`] on
//! registration and removal. Logout is idempotent: the intake is closed and
//! emptied, pending actions are interrupted, the familiar is released and the
//! transport is disconnected at most once.
//!
//! ### Idle Detection
//! A player that has sent nothing for longer than the configured idle window
//! is logged out at the end of its tick, after that tick's commands ran.
//!
//! ## Module Organization
//!
//! - `account`: privilege levels and game modes
//! - `config`: tunables derived from the command line
//! - `dispatcher`: opcode to handler routing
//! - `entity`: the tick contract, world snapshot and deferred requests
//! - `error`: command and server error types
//! - `handlers`: built-in command handlers
//! - `intake`: the per-player concurrent command queue
//! - `network`: UDP socket tasks and the main loop
//! - `npc`: wandering NPCs and familiars
//! - `player`: per-player state and the player tick
//! - `registry`: player and NPC registries
//! - `transport`: the outbound connection seam
//! - `visibility`: mark/apply interest reconciliation
//! - `world`: registries plus the scheduler pass
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:43594", ServerConfig::default()).await?;
//!
//!     // Runs until Ctrl+C, then logs every player out
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod intake;
pub mod network;
pub mod npc;
pub mod player;
pub mod registry;
pub mod transport;
pub mod utils;
pub mod visibility;
pub mod world;
