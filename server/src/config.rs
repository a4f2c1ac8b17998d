//! Runtime configuration for the tick server.

use crate::utils::minutes_to_millis;
use shared::{Location, DEFAULT_LOCATION, MAXIMUM_INTERACTION_DISTANCE};
use std::time::Duration;

/// Settings consumed by the world and its entities.
///
/// The binary fills this from command-line arguments; tests usually start
/// from `ServerConfig::default()` and override individual fields.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Duration of one scheduler step
    pub tick_duration: Duration,
    /// Maximum number of concurrently registered players
    pub max_players: usize,
    /// Minutes without a received command before a player is logged out
    pub idle_disconnect_minutes: u64,
    /// Entities closer than this are part of a player's local interest
    pub interaction_distance: f32,
    /// Where players are placed on login
    pub spawn_location: Location,
}

impl ServerConfig {
    /// Idle threshold expressed in the tick clock's unit.
    pub fn idle_threshold_millis(&self) -> u64 {
        minutes_to_millis(self.idle_disconnect_minutes)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(600),
            max_players: 2000,
            idle_disconnect_minutes: 5,
            interaction_distance: MAXIMUM_INTERACTION_DISTANCE,
            spawn_location: DEFAULT_LOCATION,
        }
    }
}
