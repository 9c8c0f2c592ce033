use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, CommunityId, DirectMessage, Notice, RoleId, UserId};
use crate::error::PlatformResult;

/// A channel category and how full it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: ChannelId,
    pub channel_count: usize,
}

/// Capabilities the coordinator needs from the chat platform.
///
/// Every call may fail independently. The coordinator only ever creates roles and
/// channels; their lifecycle afterwards belongs to the platform. Role assignments are
/// granted and revoked per member.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    async fn grant_role(
        &self,
        community: CommunityId,
        user: UserId,
        role: RoleId,
    ) -> PlatformResult<()>;

    async fn revoke_role(
        &self,
        community: CommunityId,
        user: UserId,
        role: RoleId,
    ) -> PlatformResult<()>;

    async fn create_role(&self, community: CommunityId, name: &str) -> PlatformResult<RoleId>;

    /// Categories whose name matches `name`, ignoring case
    async fn team_categories(
        &self,
        community: CommunityId,
        name: &str,
    ) -> PlatformResult<Vec<CategoryInfo>>;

    async fn create_category(&self, community: CommunityId, name: &str)
        -> PlatformResult<ChannelId>;

    async fn create_text_channel(
        &self,
        community: CommunityId,
        category: Option<ChannelId>,
        name: &str,
    ) -> PlatformResult<ChannelId>;

    async fn create_voice_channel(
        &self,
        community: CommunityId,
        category: Option<ChannelId>,
        name: &str,
    ) -> PlatformResult<ChannelId>;

    /// Hide the channel from everyone except holders of `role`
    async fn restrict_channel_to_role(
        &self,
        community: CommunityId,
        channel: ChannelId,
        role: RoleId,
    ) -> PlatformResult<()>;

    async fn send_direct_message(&self, message: &DirectMessage) -> PlatformResult<()>;

    async fn send_channel_message(&self, channel: ChannelId, notice: &Notice)
        -> PlatformResult<()>;
}
