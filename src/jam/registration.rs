use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::coordination::{SideEffect, SideEffectQueue};
use crate::domain::window::WindowPosition;
use crate::domain::{Clock, JamId, UserId};
use crate::error::{JamError, RegistrationClosed, Result};
use crate::jam::SettingsService;
use crate::ports::{JamStore, LockKey};

/// A successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub jam: JamId,
    pub user: UserId,
    /// When building starts, for the confirmation message
    pub jam_starts_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RegistrationTracker {
    store: Arc<dyn JamStore>,
    settings: SettingsService,
    clock: Arc<dyn Clock>,
    effects: Arc<SideEffectQueue>,
}

impl RegistrationTracker {
    pub fn new(
        store: Arc<dyn JamStore>,
        settings: SettingsService,
        clock: Arc<dyn Clock>,
        effects: Arc<SideEffectQueue>,
    ) -> Self {
        Self {
            store,
            settings,
            clock,
            effects,
        }
    }

    /// Register `user` for `jam` while its registration window is open.
    ///
    /// The jam role is granted afterwards on a best-effort basis; a failed grant
    /// leaves the registration in place.
    #[instrument(skip(self))]
    pub async fn register(&self, jam: JamId, user: UserId) -> Result<Registration> {
        let current = self
            .store
            .load_jam(jam)
            .await?
            .ok_or(JamError::JamNotFound(jam))?;

        let window = current.windows.registration();
        match window.position(self.clock.now()) {
            WindowPosition::Before => {
                return Err(JamError::OutsideRegistrationWindow(
                    RegistrationClosed::NotYetOpen {
                        opens_at: window.start(),
                    },
                ))
            }
            WindowPosition::After => {
                return Err(JamError::OutsideRegistrationWindow(
                    RegistrationClosed::AlreadyClosed,
                ))
            }
            WindowPosition::Inside => {}
        }

        if current.is_registered(user) || !self.store.add_registration(jam, user).await? {
            debug!("User {} already registered for jam {}", user, jam);
            return Err(JamError::AlreadyRegistered);
        }
        info!("User {} registered for jam {}", user, jam);

        let settings = self.settings.get(current.community).await?;
        match settings.jam_role {
            Some(role) => self.effects.submit(SideEffect::GrantRole {
                community: current.community,
                user,
                role,
            }),
            None => debug!("No jam role configured for {}", current.community),
        }

        Ok(Registration {
            jam,
            user,
            jam_starts_at: current.windows.active().start(),
        })
    }

    /// Withdraw `user` from `jam`. Members of a team must stay registered.
    ///
    /// Pending invites to the user are cancelled in the same scope and the jam role,
    /// if configured, is revoked afterwards on a best-effort basis.
    #[instrument(skip(self))]
    pub async fn unregister(&self, jam: JamId, user: UserId) -> Result<()> {
        let current = self
            .store
            .load_jam(jam)
            .await?
            .ok_or(JamError::JamNotFound(jam))?;

        if current.windows.active().has_ended(self.clock.now()) {
            return Err(JamError::JamEnded);
        }

        let mut scope = self.store.begin(vec![LockKey::Member { jam, user }]).await?;

        if scope.team_of(jam, user).await?.is_some() {
            return Err(JamError::AlreadyInTeam);
        }
        if !scope.remove_registration(jam, user).await? {
            return Err(JamError::NotRegistered);
        }
        let cancelled = scope.cancel_pending_for_invitee(jam, user, None).await?;
        scope.commit().await?;

        info!(
            "User {} unregistered from jam {} ({} pending invite(s) cancelled)",
            user,
            jam,
            cancelled.len()
        );
        if let Some(role) = self.settings.get(current.community).await?.jam_role {
            self.effects.submit(SideEffect::RevokeRole {
                community: current.community,
                user,
                role,
            });
        }
        Ok(())
    }
}
