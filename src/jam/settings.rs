use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::{CommunityId, JamSettings, RoleId};
use crate::error::{JamError, Result};
use crate::ports::JamStore;

/// Per-community settings with configured fallbacks
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn JamStore>,
    default_team_size: u32,
}

impl SettingsService {
    pub fn new(store: Arc<dyn JamStore>, default_team_size: u32) -> Self {
        Self {
            store,
            default_team_size: default_team_size.max(1),
        }
    }

    /// Stored settings, or the defaults when the community never configured any
    pub async fn get(&self, community: CommunityId) -> Result<JamSettings> {
        Ok(self
            .store
            .load_settings(community)
            .await?
            .unwrap_or_else(|| JamSettings::defaults(community, self.default_team_size)))
    }

    #[instrument(skip(self))]
    pub async fn set_jam_role(
        &self,
        community: CommunityId,
        role: Option<RoleId>,
    ) -> Result<JamSettings> {
        let mut settings = self.get(community).await?;
        settings.jam_role = role;
        self.store.save_settings(&settings).await?;
        info!("Jam role for {} set to {:?}", community, role);
        Ok(settings)
    }

    #[instrument(skip(self))]
    pub async fn set_team_size(&self, community: CommunityId, size: u32) -> Result<JamSettings> {
        if size == 0 {
            return Err(JamError::InvalidInput(
                "team size must be at least 1".to_string(),
            ));
        }

        let mut settings = self.get(community).await?;
        settings.team_size = size;
        self.store.save_settings(&settings).await?;
        info!("Team size for {} set to {}", community, size);
        Ok(settings)
    }
}
