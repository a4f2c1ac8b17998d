use thiserror::Error;

/// Failure of a single command; contained at the dispatcher
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("player is muted")]
    Muted,
    #[error("action is on cooldown")]
    Throttled,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Errors surfaced by registration and the network server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Server full")]
    ServerFull,
    #[error("{0} is already logged in")]
    AlreadyOnline(String),
    #[error("Invalid display name")]
    InvalidDisplayName,
    #[error("Protocol version mismatch (client {0})")]
    UnsupportedVersion(u32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
}
