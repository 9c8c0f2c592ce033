use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{ChannelId, JamId, RoleId, TeamId, UserId};
use crate::error::{JamError, Result};

/// Role names on the platform are capped at 100 characters
pub const MAX_TEAM_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub jam: JamId,
    pub name: String,
    pub leader: UserId,
    pub role: RoleId,
    pub text_channel: ChannelId,
    pub voice_channel: ChannelId,
    /// Always contains `leader`
    pub members: BTreeSet<UserId>,
}

impl Team {
    pub fn is_leader(&self, user: UserId) -> bool {
        self.leader == user
    }

    pub fn has_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// A fully provisioned team that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeam {
    pub jam: JamId,
    pub name: String,
    pub leader: UserId,
    pub role: RoleId,
    pub text_channel: ChannelId,
    pub voice_channel: ChannelId,
}

/// A user's seat in a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Membership {
    pub jam: JamId,
    pub team: TeamId,
    pub user: UserId,
}

/// Normalize and check a requested team name.
///
/// Names are compared case-sensitively after trimming.
pub fn validate_team_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(JamError::InvalidInput("team name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_TEAM_NAME_LEN {
        return Err(JamError::InvalidInput(format!(
            "team name must be at most {} characters",
            MAX_TEAM_NAME_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(JamError::InvalidInput(
            "team name must not contain control characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Text channel name for a team: spaces become dashes, lowercase
pub fn text_channel_name(team_name: &str) -> String {
    team_name.replace(' ', "-").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_names_are_trimmed_and_bounded() {
        assert_eq!(validate_team_name("  Alpha  ").unwrap(), "Alpha");
        assert!(validate_team_name("   ").is_err());
        assert!(validate_team_name(&"x".repeat(MAX_TEAM_NAME_LEN + 1)).is_err());
        assert!(validate_team_name("tab\tname").is_err());
        assert_eq!(validate_team_name(&"é".repeat(MAX_TEAM_NAME_LEN)).unwrap().chars().count(), 100);
    }

    #[test]
    fn channel_name_replaces_spaces() {
        assert_eq!(text_channel_name("Pixel Pushers"), "pixel-pushers");
    }
}
