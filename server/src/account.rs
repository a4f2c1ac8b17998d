//! Account-level attributes read by authorization checks.

use serde::{Deserialize, Serialize};

/// Staff level attached to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Privilege {
    #[default]
    Regular,
    Moderator,
    GithubContributor,
    Administrator,
    Root,
}

impl Privilege {
    /// True for accounts allowed to use developer tooling
    pub fn is_developer(&self) -> bool {
        matches!(
            self,
            Privilege::GithubContributor | Privilege::Administrator | Privilege::Root
        )
    }

    /// True for every staff level
    pub fn is_moderator(&self) -> bool {
        *self != Privilege::Regular
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameMode {
    #[default]
    Standard,
    Ironman,
    HardcoreIronman,
}
