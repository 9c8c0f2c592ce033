//! In-memory store used for dry runs and tests.
//!
//! Atomic scopes take one async mutex per [`LockKey`], work on a snapshot of the state,
//! and replay their staged mutations onto the shared state on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, instrument};

use crate::domain::{
    CommunityId, Invite, InviteId, InviteStatus, Jam, JamId, JamSettings, NewJam, NewTeam, Team,
    TeamId, UserId,
};
use crate::error::{JamError, Result};
use crate::ports::{AtomicScope, JamStore, LockKey};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    jams: BTreeMap<JamId, Jam>,
    settings: HashMap<CommunityId, JamSettings>,
    teams: BTreeMap<TeamId, Team>,
    invites: HashMap<InviteId, Invite>,
}

impl MemoryState {
    fn team_of(&self, jam: JamId, user: UserId) -> Option<&Team> {
        self.teams
            .values()
            .find(|t| t.jam == jam && t.members.contains(&user))
    }

    fn team_by_name(&self, jam: JamId, name: &str) -> Option<&Team> {
        self.teams.values().find(|t| t.jam == jam && t.name == name)
    }

    fn pending_invites<'a>(
        &'a self,
        filter: impl Fn(&Invite) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Invite> + 'a {
        self.invites
            .values()
            .filter(move |i| i.status == InviteStatus::Pending && filter(i))
    }
}

#[derive(Debug, Clone)]
enum Mutation {
    InsertTeam(Team),
    AddMember { team: TeamId, user: UserId },
    PutInvite(Invite),
    RemoveRegistration { jam: JamId, user: UserId },
}

/// In-memory implementation of [`JamStore`]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
    next_jam_id: AtomicI64,
    next_team_id: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            locks: DashMap::new(),
            next_jam_id: AtomicI64::new(1),
            next_team_id: AtomicI64::new(1),
        }
    }

    /// Every invite ever issued for a team, any status
    pub async fn invites_for_team(&self, team: TeamId) -> Vec<Invite> {
        let state = self.state.read().await;
        let mut invites: Vec<Invite> = state
            .invites
            .values()
            .filter(|i| i.team == team)
            .cloned()
            .collect();
        invites.sort_by_key(|i| i.issued_at);
        invites
    }
}

#[async_trait]
impl JamStore for MemoryStore {
    #[instrument(skip(self, jam), fields(community = %jam.community))]
    async fn insert_jam(&self, jam: &NewJam) -> Result<Jam> {
        let id = JamId(self.next_jam_id.fetch_add(1, Ordering::SeqCst));
        let created = Jam {
            id,
            community: jam.community,
            topic: jam.topic.clone(),
            tagline: jam.tagline.clone(),
            timezone: jam.timezone.clone(),
            windows: jam.windows,
            voting_open: false,
            registrations: BTreeSet::new(),
        };
        self.state.write().await.jams.insert(id, created.clone());
        debug!("Stored jam {}", id);
        Ok(created)
    }

    async fn load_jam(&self, id: JamId) -> Result<Option<Jam>> {
        Ok(self.state.read().await.jams.get(&id).cloned())
    }

    async fn next_or_current_jam(
        &self,
        community: CommunityId,
        now: DateTime<Utc>,
    ) -> Result<Option<Jam>> {
        let state = self.state.read().await;
        Ok(state
            .jams
            .values()
            .filter(|j| j.community == community && !j.has_ended(now))
            .min_by_key(|j| (j.windows.active().start(), j.id))
            .cloned())
    }

    async fn set_voting(&self, jam: JamId, open: bool) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.jams.get_mut(&jam) {
            Some(stored) => {
                stored.voting_open = open;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_registration(&self, jam: JamId, user: UserId) -> Result<bool> {
        let mut state = self.state.write().await;
        let stored = state.jams.get_mut(&jam).ok_or(JamError::JamNotFound(jam))?;
        Ok(stored.registrations.insert(user))
    }

    async fn load_settings(&self, community: CommunityId) -> Result<Option<JamSettings>> {
        Ok(self.state.read().await.settings.get(&community).copied())
    }

    async fn save_settings(&self, settings: &JamSettings) -> Result<()> {
        self.state
            .write()
            .await
            .settings
            .insert(settings.community, *settings);
        Ok(())
    }

    async fn load_team(&self, id: TeamId) -> Result<Option<Team>> {
        Ok(self.state.read().await.teams.get(&id).cloned())
    }

    async fn find_team_by_member(&self, jam: JamId, user: UserId) -> Result<Option<Team>> {
        Ok(self.state.read().await.team_of(jam, user).cloned())
    }

    async fn find_team_by_name(&self, jam: JamId, name: &str) -> Result<Option<Team>> {
        Ok(self.state.read().await.team_by_name(jam, name).cloned())
    }

    async fn team_members(&self, team: TeamId) -> Result<BTreeSet<UserId>> {
        let state = self.state.read().await;
        state
            .teams
            .get(&team)
            .map(|t| t.members.clone())
            .ok_or(JamError::TeamNotFound(team))
    }

    async fn load_invite(&self, id: InviteId) -> Result<Option<Invite>> {
        Ok(self.state.read().await.invites.get(&id).cloned())
    }

    async fn begin(&self, mut keys: Vec<LockKey>) -> Result<Box<dyn AtomicScope + '_>> {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = self
                .locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }

        let working = self.state.read().await.clone();
        Ok(Box::new(MemoryScope {
            store: self,
            _guards: guards,
            working,
            staged: Vec::new(),
        }))
    }
}

struct MemoryScope<'a> {
    store: &'a MemoryStore,
    _guards: Vec<OwnedMutexGuard<()>>,
    working: MemoryState,
    staged: Vec<Mutation>,
}

impl MemoryScope<'_> {
    fn put_invite(&mut self, invite: Invite) {
        self.working.invites.insert(invite.id, invite.clone());
        self.staged.push(Mutation::PutInvite(invite));
    }

    fn cancel_where(&mut self, filter: impl Fn(&Invite) -> bool) -> Vec<InviteId> {
        let cancelled: Vec<Invite> = self
            .working
            .pending_invites(filter)
            .cloned()
            .map(|mut i| {
                i.status = InviteStatus::Cancelled;
                i
            })
            .collect();
        let ids = cancelled.iter().map(|i| i.id).collect();
        for invite in cancelled {
            self.put_invite(invite);
        }
        ids
    }
}

#[async_trait]
impl AtomicScope for MemoryScope<'_> {
    async fn load_jam(&mut self, id: JamId) -> Result<Option<Jam>> {
        Ok(self.working.jams.get(&id).cloned())
    }

    async fn load_invite(&mut self, id: InviteId) -> Result<Option<Invite>> {
        Ok(self.working.invites.get(&id).cloned())
    }

    async fn team_of(&mut self, jam: JamId, user: UserId) -> Result<Option<TeamId>> {
        Ok(self.working.team_of(jam, user).map(|t| t.id))
    }

    async fn team_by_name(&mut self, jam: JamId, name: &str) -> Result<Option<TeamId>> {
        Ok(self.working.team_by_name(jam, name).map(|t| t.id))
    }

    async fn member_count(&mut self, team: TeamId) -> Result<usize> {
        self.working
            .teams
            .get(&team)
            .map(|t| t.members.len())
            .ok_or(JamError::TeamNotFound(team))
    }

    async fn insert_team(&mut self, team: &NewTeam) -> Result<Team> {
        if self.working.team_by_name(team.jam, &team.name).is_some() {
            return Err(JamError::NameTaken(team.name.clone()));
        }
        if self.working.team_of(team.jam, team.leader).is_some() {
            return Err(JamError::AlreadyInTeam);
        }

        let id = TeamId(self.store.next_team_id.fetch_add(1, Ordering::SeqCst));
        let created = Team {
            id,
            jam: team.jam,
            name: team.name.clone(),
            leader: team.leader,
            role: team.role,
            text_channel: team.text_channel,
            voice_channel: team.voice_channel,
            members: BTreeSet::from([team.leader]),
        };
        self.working.teams.insert(id, created.clone());
        self.staged.push(Mutation::InsertTeam(created.clone()));
        Ok(created)
    }

    async fn add_member(&mut self, jam: JamId, team: TeamId, user: UserId) -> Result<()> {
        if self.working.team_of(jam, user).is_some() {
            return Err(JamError::AlreadyInTeam);
        }
        let stored = self
            .working
            .teams
            .get_mut(&team)
            .ok_or(JamError::TeamNotFound(team))?;
        stored.members.insert(user);
        self.staged.push(Mutation::AddMember { team, user });
        Ok(())
    }

    async fn insert_invite(&mut self, invite: &Invite) -> Result<()> {
        let duplicate = self
            .working
            .pending_invites(|i| i.team == invite.team && i.invitee == invite.invitee)
            .next()
            .is_some();
        if invite.status == InviteStatus::Pending && duplicate {
            return Err(JamError::Internal(format!(
                "pending invite already exists for team {} and user {}",
                invite.team, invite.invitee
            )));
        }
        self.put_invite(invite.clone());
        Ok(())
    }

    async fn set_invite_status(&mut self, id: InviteId, status: InviteStatus) -> Result<()> {
        let mut invite = self
            .working
            .invites
            .get(&id)
            .cloned()
            .ok_or(JamError::InviteNotFound(id))?;
        invite.status = status;
        self.put_invite(invite);
        Ok(())
    }

    async fn cancel_pending_for_pair(
        &mut self,
        team: TeamId,
        invitee: UserId,
    ) -> Result<Vec<InviteId>> {
        Ok(self.cancel_where(|i| i.team == team && i.invitee == invitee))
    }

    async fn cancel_pending_for_invitee(
        &mut self,
        jam: JamId,
        invitee: UserId,
        keep: Option<InviteId>,
    ) -> Result<Vec<InviteId>> {
        Ok(self.cancel_where(|i| i.jam == jam && i.invitee == invitee && Some(i.id) != keep))
    }

    async fn remove_registration(&mut self, jam: JamId, user: UserId) -> Result<bool> {
        let stored = self
            .working
            .jams
            .get_mut(&jam)
            .ok_or(JamError::JamNotFound(jam))?;
        if !stored.registrations.remove(&user) {
            return Ok(false);
        }
        self.staged.push(Mutation::RemoveRegistration { jam, user });
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let mut state = this.store.state.write().await;
        for mutation in this.staged {
            match mutation {
                Mutation::InsertTeam(team) => {
                    state.teams.insert(team.id, team);
                }
                Mutation::AddMember { team, user } => {
                    if let Some(stored) = state.teams.get_mut(&team) {
                        stored.members.insert(user);
                    }
                }
                Mutation::PutInvite(invite) => {
                    state.invites.insert(invite.id, invite);
                }
                Mutation::RemoveRegistration { jam, user } => {
                    if let Some(stored) = state.jams.get_mut(&jam) {
                        stored.registrations.remove(&user);
                    }
                }
            }
        }
        Ok(())
    }
}
