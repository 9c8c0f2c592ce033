use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::domain::{
    CommunityId, Invite, InviteId, InviteStatus, Jam, JamId, JamSettings, NewJam, NewTeam, Team,
    TeamId, UserId,
};
use crate::error::Result;

/// Serialization keys for atomic scopes.
///
/// Two scopes that share a key never overlap in time. Keys are always acquired in
/// sorted order, so callers may pass them in any order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    /// Membership count of one team
    Team(TeamId),
    /// A user's team seat within one jam
    Member { jam: JamId, user: UserId },
    /// A team name within one jam
    TeamName { jam: JamId, name: String },
}

impl LockKey {
    /// Stable textual form, used for advisory locks
    pub fn as_key(&self) -> String {
        match self {
            LockKey::Team(team) => format!("gamejam:team:{}", team),
            LockKey::Member { jam, user } => format!("gamejam:member:{}:{}", jam, user),
            LockKey::TeamName { jam, name } => format!("gamejam:team-name:{}:{}", jam, name),
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

/// Persistence port: the single source of truth for jams, settings, teams and invites
#[async_trait]
pub trait JamStore: Send + Sync {
    async fn insert_jam(&self, jam: &NewJam) -> Result<Jam>;

    async fn load_jam(&self, id: JamId) -> Result<Option<Jam>>;

    /// The community's jam whose voting window has not ended yet, earliest
    /// active-window start first, lowest id on ties
    async fn next_or_current_jam(
        &self,
        community: CommunityId,
        now: DateTime<Utc>,
    ) -> Result<Option<Jam>>;

    /// Returns false when the jam does not exist
    async fn set_voting(&self, jam: JamId, open: bool) -> Result<bool>;

    /// Returns false when the user was already registered
    async fn add_registration(&self, jam: JamId, user: UserId) -> Result<bool>;

    async fn load_settings(&self, community: CommunityId) -> Result<Option<JamSettings>>;

    async fn save_settings(&self, settings: &JamSettings) -> Result<()>;

    async fn load_team(&self, id: TeamId) -> Result<Option<Team>>;

    async fn find_team_by_member(&self, jam: JamId, user: UserId) -> Result<Option<Team>>;

    /// Exact, case-sensitive match
    async fn find_team_by_name(&self, jam: JamId, name: &str) -> Result<Option<Team>>;

    async fn team_members(&self, team: TeamId) -> Result<BTreeSet<UserId>>;

    async fn load_invite(&self, id: InviteId) -> Result<Option<Invite>>;

    /// Open an atomic scope serialized on `keys`. Dropping the scope without
    /// calling [`AtomicScope::commit`] discards every change made through it.
    async fn begin(&self, keys: Vec<LockKey>) -> Result<Box<dyn AtomicScope + '_>>;
}

/// Reads and writes inside one atomic scope
#[async_trait]
pub trait AtomicScope: Send {
    async fn load_jam(&mut self, id: JamId) -> Result<Option<Jam>>;

    async fn load_invite(&mut self, id: InviteId) -> Result<Option<Invite>>;

    async fn team_of(&mut self, jam: JamId, user: UserId) -> Result<Option<TeamId>>;

    async fn team_by_name(&mut self, jam: JamId, name: &str) -> Result<Option<TeamId>>;

    async fn member_count(&mut self, team: TeamId) -> Result<usize>;

    /// Persist a team with its leader as the only member
    async fn insert_team(&mut self, team: &NewTeam) -> Result<Team>;

    async fn add_member(&mut self, jam: JamId, team: TeamId, user: UserId) -> Result<()>;

    async fn insert_invite(&mut self, invite: &Invite) -> Result<()>;

    async fn set_invite_status(&mut self, id: InviteId, status: InviteStatus) -> Result<()>;

    /// Cancel the pending invite (if any) for this team/invitee pair
    async fn cancel_pending_for_pair(
        &mut self,
        team: TeamId,
        invitee: UserId,
    ) -> Result<Vec<InviteId>>;

    /// Cancel every pending invite to `invitee` in `jam` except `keep`
    async fn cancel_pending_for_invitee(
        &mut self,
        jam: JamId,
        invitee: UserId,
        keep: Option<InviteId>,
    ) -> Result<Vec<InviteId>>;

    /// Returns false when the user was not registered
    async fn remove_registration(&mut self, jam: JamId, user: UserId) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
