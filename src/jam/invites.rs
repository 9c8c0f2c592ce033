//! Invite handshake between a team leader and a registered, teamless user.
//!
//! The acceptance control sent with an invite carries only the invite id. Accepting
//! re-reads everything from storage inside one atomic scope keyed by the team and by the
//! invitee's seat in the jam, so concurrent accepts against the same team or by the same
//! invitee are linearized.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::coordination::{SideEffect, SideEffectQueue};
use crate::domain::{
    AcceptControl, Clock, DirectMessage, Invite, InviteId, InviteStatus, JamId, Membership,
    Notice, UserId,
};
use crate::error::{JamError, Result};
use crate::jam::SettingsService;
use crate::ports::{AtomicScope, JamStore, LockKey};

#[derive(Clone)]
pub struct InviteCoordinator {
    store: Arc<dyn JamStore>,
    settings: SettingsService,
    clock: Arc<dyn Clock>,
    effects: Arc<SideEffectQueue>,
    timeout: Duration,
}

impl InviteCoordinator {
    pub fn new(
        store: Arc<dyn JamStore>,
        settings: SettingsService,
        clock: Arc<dyn Clock>,
        effects: Arc<SideEffectQueue>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            settings,
            clock,
            effects,
            timeout,
        }
    }

    /// Invite `invitee` into the team led by `inviter`.
    ///
    /// A previous pending invite for the same pair is superseded (cancelled). Invites are
    /// only issued while the jam's active window is open.
    #[instrument(skip(self))]
    pub async fn invite(&self, jam: JamId, inviter: UserId, invitee: UserId) -> Result<Invite> {
        let current = self
            .store
            .load_jam(jam)
            .await?
            .ok_or(JamError::JamNotFound(jam))?;

        if current.is_voting() {
            return Err(JamError::VotingActive);
        }
        current.check_team_formation(self.clock.now())?;
        let team = self
            .store
            .find_team_by_member(jam, inviter)
            .await?
            .ok_or(JamError::NoTeam)?;
        if !team.is_leader(inviter) {
            return Err(JamError::NotLeader);
        }

        let max = self.settings.get(current.community).await?.team_size;
        if team.member_count() >= max as usize {
            return Err(JamError::TeamFull { max });
        }
        if !current.is_registered(invitee) {
            return Err(JamError::InviteeNotRegistered);
        }

        let mut scope = self
            .store
            .begin(vec![
                LockKey::Team(team.id),
                LockKey::Member { jam, user: invitee },
            ])
            .await?;

        if scope.team_of(jam, invitee).await?.is_some() {
            return Err(JamError::InviteeAlreadyTeamed);
        }
        let locked = scope.load_jam(jam).await?.ok_or(JamError::JamNotFound(jam))?;
        if !locked.is_registered(invitee) {
            return Err(JamError::InviteeNotRegistered);
        }
        if scope.member_count(team.id).await? >= max as usize {
            return Err(JamError::TeamFull { max });
        }

        let superseded = scope.cancel_pending_for_pair(team.id, invitee).await?;
        if !superseded.is_empty() {
            debug!("Superseded {} pending invite(s)", superseded.len());
        }

        let invite = Invite::issue(jam, team.id, inviter, invitee, self.clock.now());
        scope.insert_invite(&invite).await?;
        scope.commit().await?;

        info!(
            "Invite {} issued: {} -> {} for team '{}'",
            invite.id, inviter, invitee, team.name
        );
        self.effects.submit(SideEffect::DirectMessage(DirectMessage {
            recipient: invitee,
            title: Notice::invite_title(&current.topic),
            body: Notice::invite_body(inviter, &team.name),
            control: Some(invite.control()),
        }));
        Ok(invite)
    }

    /// Accept an invite. Accepting an already accepted invite returns the same membership.
    #[instrument(skip(self))]
    pub async fn accept(&self, id: InviteId) -> Result<Membership> {
        let invite = self
            .store
            .load_invite(id)
            .await?
            .ok_or(JamError::InviteNotFound(id))?;
        let team = self
            .store
            .load_team(invite.team)
            .await?
            .ok_or(JamError::TeamNotFound(invite.team))?;

        let membership = Membership {
            jam: invite.jam,
            team: invite.team,
            user: invite.invitee,
        };

        let mut scope = self
            .store
            .begin(vec![
                LockKey::Team(invite.team),
                LockKey::Member {
                    jam: invite.jam,
                    user: invite.invitee,
                },
            ])
            .await?;

        // re-read under the locks
        let invite = scope
            .load_invite(id)
            .await?
            .ok_or(JamError::InviteNotFound(id))?;
        let now = self.clock.now();

        match invite.status {
            InviteStatus::Accepted => {
                debug!("Invite {} already accepted", id);
                return Ok(membership);
            }
            InviteStatus::Expired => return Err(JamError::InviteExpired),
            InviteStatus::Cancelled => {
                return if scope.team_of(invite.jam, invite.invitee).await?.is_some() {
                    Err(JamError::AlreadyInTeam)
                } else {
                    Err(JamError::InviteCancelled)
                };
            }
            InviteStatus::Pending if invite.is_stale(now, self.timeout) => {
                close_invite(scope, id, InviteStatus::Expired).await?;
                debug!("Invite {} expired", id);
                return Err(JamError::InviteExpired);
            }
            InviteStatus::Pending => {}
        }

        let jam = match scope.load_jam(invite.jam).await? {
            Some(jam) => jam,
            None => {
                close_invite(scope, id, InviteStatus::Cancelled).await?;
                return Err(JamError::JamEnded);
            }
        };
        let max = self.settings.get(jam.community).await?.team_size;

        if scope.member_count(invite.team).await? >= max as usize {
            warn!("Invite {} lost the race for a seat in team {}", id, invite.team);
            return Err(JamError::TeamFull { max });
        }
        if scope.team_of(invite.jam, invite.invitee).await?.is_some() {
            return Err(JamError::AlreadyInTeam);
        }
        // building is over once the active window closes, voting flag or not
        if jam.is_voting() || jam.windows.active().has_ended(now) {
            close_invite(scope, id, InviteStatus::Cancelled).await?;
            return Err(JamError::JamEnded);
        }

        scope
            .add_member(invite.jam, invite.team, invite.invitee)
            .await?;
        scope.set_invite_status(id, InviteStatus::Accepted).await?;
        let cancelled = scope
            .cancel_pending_for_invitee(invite.jam, invite.invitee, Some(id))
            .await?;
        scope.commit().await?;

        info!(
            "User {} joined team '{}' ({} other invite(s) cancelled)",
            invite.invitee,
            team.name,
            cancelled.len()
        );
        self.effects.submit(SideEffect::GrantRole {
            community: jam.community,
            user: invite.invitee,
            role: team.role,
        });
        self.effects.submit(SideEffect::ChannelMessage {
            channel: team.text_channel,
            notice: Notice::joined_broadcast(invite.invitee),
        });
        Ok(membership)
    }

    /// Route a pressed acceptance control to [`Self::accept`]
    pub async fn handle_control(&self, custom_id: &str) -> Result<Membership> {
        let control = AcceptControl::parse(custom_id).ok_or_else(|| {
            JamError::InvalidInput(format!("not an invite control: {}", custom_id))
        })?;
        self.accept(control.invite).await
    }
}

/// Move an invite to a terminal status and commit, ending the scope
async fn close_invite(
    mut scope: Box<dyn AtomicScope + '_>,
    id: InviteId,
    status: InviteStatus,
) -> Result<()> {
    scope.set_invite_status(id, status).await?;
    scope.commit().await
}
