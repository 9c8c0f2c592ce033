//! Platform that only logs what it would do.
//!
//! Used when no bot token is configured or `discord.dry_run` is set.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::domain::{ChannelId, CommunityId, DirectMessage, Notice, RoleId, UserId};
use crate::error::PlatformResult;
use crate::ports::{CategoryInfo, Platform};

const SYNTHETIC_ID_BASE: u64 = 900_000_000_000_000_000;

/// Logs every call and hands out synthetic snowflakes
pub struct DryRunPlatform {
    next_id: AtomicU64,
    /// category id -> (community, name, child channel count)
    categories: DashMap<ChannelId, (CommunityId, String, usize)>,
}

impl Default for DryRunPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunPlatform {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(SYNTHETIC_ID_BASE),
            categories: DashMap::new(),
        }
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn track_child(&self, category: Option<ChannelId>) {
        if let Some(category) = category {
            if let Some(mut entry) = self.categories.get_mut(&category) {
                entry.2 += 1;
            }
        }
    }
}

#[async_trait]
impl Platform for DryRunPlatform {
    async fn grant_role(
        &self,
        community: CommunityId,
        user: UserId,
        role: RoleId,
    ) -> PlatformResult<()> {
        info!("[DRY RUN] grant role {} to {} in {}", role, user, community);
        Ok(())
    }

    async fn revoke_role(
        &self,
        community: CommunityId,
        user: UserId,
        role: RoleId,
    ) -> PlatformResult<()> {
        info!("[DRY RUN] revoke role {} from {} in {}", role, user, community);
        Ok(())
    }

    async fn create_role(&self, community: CommunityId, name: &str) -> PlatformResult<RoleId> {
        let role = RoleId(self.next());
        info!("[DRY RUN] create role '{}' ({}) in {}", name, role, community);
        Ok(role)
    }

    async fn team_categories(
        &self,
        community: CommunityId,
        name: &str,
    ) -> PlatformResult<Vec<CategoryInfo>> {
        let mut found: Vec<CategoryInfo> = self
            .categories
            .iter()
            .filter(|e| e.value().0 == community && e.value().1.eq_ignore_ascii_case(name))
            .map(|e| CategoryInfo {
                id: *e.key(),
                channel_count: e.value().2,
            })
            .collect();
        found.sort_by_key(|c| c.id);
        Ok(found)
    }

    async fn create_category(
        &self,
        community: CommunityId,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        let id = ChannelId(self.next());
        self.categories
            .insert(id, (community, name.to_string(), 0));
        info!("[DRY RUN] create category '{}' ({}) in {}", name, id, community);
        Ok(id)
    }

    async fn create_text_channel(
        &self,
        community: CommunityId,
        category: Option<ChannelId>,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        let id = ChannelId(self.next());
        self.track_child(category);
        info!(
            "[DRY RUN] create text channel #{} ({}) in {} under {:?}",
            name, id, community, category
        );
        Ok(id)
    }

    async fn create_voice_channel(
        &self,
        community: CommunityId,
        category: Option<ChannelId>,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        let id = ChannelId(self.next());
        self.track_child(category);
        info!(
            "[DRY RUN] create voice channel '{}' ({}) in {} under {:?}",
            name, id, community, category
        );
        Ok(id)
    }

    async fn restrict_channel_to_role(
        &self,
        _community: CommunityId,
        channel: ChannelId,
        role: RoleId,
    ) -> PlatformResult<()> {
        info!("[DRY RUN] restrict channel {} to role {}", channel, role);
        Ok(())
    }

    async fn send_direct_message(&self, message: &DirectMessage) -> PlatformResult<()> {
        info!(
            "[DRY RUN] DM to {}: {} | {}{}",
            message.recipient,
            message.title.render_default(),
            message.body.render_default(),
            message
                .control
                .map(|c| format!(" [{}]", c.custom_id()))
                .unwrap_or_default()
        );
        Ok(())
    }

    async fn send_channel_message(
        &self,
        channel: ChannelId,
        notice: &Notice,
    ) -> PlatformResult<()> {
        info!("[DRY RUN] message to {}: {}", channel, notice.render_default());
        Ok(())
    }
}
