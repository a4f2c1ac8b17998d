use serde::{Deserialize, Serialize};

pub const CLIENT_VERSION: u32 = 1;
pub const MAXIMUM_INTERACTION_DISTANCE: f32 = 16.0;
pub const DEFAULT_LOCATION: Location = Location { x: 122, z: 657 };
pub const YELL_COOLDOWN_MS: u64 = 15_000;
pub const WELCOME_MESSAGE: &str = "Welcome to the server.";

pub const OPCODE_HEARTBEAT: u8 = 0;
pub const OPCODE_WALK: u8 = 1;
pub const OPCODE_CHAT: u8 = 2;
pub const OPCODE_YELL: u8 = 3;
pub const OPCODE_LOGOUT: u8 = 4;

/// Ephemeral identifier, regenerated on every login.
pub type SessionId = u32;
/// Permanent identifier, stable across sessions.
pub type AccountId = u32;
pub type NpcId = u32;

/// A tile position in the world.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub x: i32,
    pub z: i32,
}

impl Location {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Euclidean distance. Defined for every pair of tiles, including the
    /// extremes of the coordinate range.
    pub fn distance(&self, other: &Location) -> f32 {
        let dx = (i64::from(other.x) - i64::from(self.x)) as f64;
        let dz = (i64::from(other.z) - i64::from(self.z)) as f64;
        (dx * dx + dz * dz).sqrt() as f32
    }

    /// Moves at most one tile along each axis towards `target`.
    pub fn step_towards(&self, target: &Location) -> Location {
        Location {
            x: self.x + target.x.cmp(&self.x) as i32,
            z: self.z + target.z.cmp(&self.z) as i32,
        }
    }
}

/// A decoded inbound command, ready to be queued for the next tick.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Command {
    Heartbeat,
    Walk { x: i32, z: i32 },
    Chat { message: String },
    Yell { message: String },
    Logout,
    /// An opcode the decoder recognised as well-formed but has no payload shape for.
    Unsupported { opcode: u8 },
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Heartbeat => OPCODE_HEARTBEAT,
            Command::Walk { .. } => OPCODE_WALK,
            Command::Chat { .. } => OPCODE_CHAT,
            Command::Yell { .. } => OPCODE_YELL,
            Command::Logout => OPCODE_LOGOUT,
            Command::Unsupported { opcode } => *opcode,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum ClientPacket {
    Login {
        client_version: u32,
        display_name: String,
    },
    Command(Command),
    Disconnect,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerPacket {
    LoginAccepted {
        session_id: SessionId,
        account_id: AccountId,
    },
    LoginRejected {
        reason: String,
    },
    GameMessage {
        text: String,
    },
    InterestUpdate {
        added_players: Vec<SessionId>,
        removed_players: Vec<SessionId>,
        added_npcs: Vec<NpcId>,
        removed_npcs: Vec<NpcId>,
    },
    Disconnected {
        reason: String,
    },
}
