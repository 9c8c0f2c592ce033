use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::ids::{InviteId, JamId, TeamId, UserId};

/// Default lifetime of an acceptance control
pub const INVITE_TIMEOUT_MINUTES: i64 = 30;

const CONTROL_PREFIX: &str = "jam-invite:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Expired,
    Cancelled,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Expired => "expired",
            InviteStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InviteStatus::Pending)
    }
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InviteStatus {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(InviteStatus::Pending),
            "accepted" => Ok(InviteStatus::Accepted),
            "expired" => Ok(InviteStatus::Expired),
            "cancelled" => Ok(InviteStatus::Cancelled),
            other => Err(format!("unknown invite status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: InviteId,
    pub jam: JamId,
    pub team: TeamId,
    pub inviter: UserId,
    pub invitee: UserId,
    pub issued_at: DateTime<Utc>,
    pub status: InviteStatus,
}

impl Invite {
    pub fn issue(
        jam: JamId,
        team: TeamId,
        inviter: UserId,
        invitee: UserId,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InviteId::new(),
            jam,
            team,
            inviter,
            invitee,
            issued_at,
            status: InviteStatus::Pending,
        }
    }

    /// A pending invite older than `timeout` can no longer be accepted
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.issued_at >= timeout
    }

    pub fn control(&self) -> AcceptControl {
        AcceptControl { invite: self.id }
    }
}

/// The button attached to an invite DM. It carries nothing but the invite identity;
/// pressing it dispatches a fresh accept that re-reads everything from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptControl {
    pub invite: InviteId,
}

impl AcceptControl {
    pub fn custom_id(&self) -> String {
        format!("{}{}", CONTROL_PREFIX, self.invite)
    }

    pub fn parse(custom_id: &str) -> Option<Self> {
        custom_id
            .strip_prefix(CONTROL_PREFIX)
            .and_then(|raw| raw.parse::<InviteId>().ok())
            .map(|invite| Self { invite })
    }
}
