//! Discord REST adapter
//!
//! Implements the platform port against the Discord HTTP API (v10). Only the handful of
//! endpoints the coordinator needs are covered; gateway events are out of scope.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::domain::{ChannelId, CommunityId, DirectMessage, Notice, RoleId, UserId};
use crate::error::{PlatformError, PlatformResult};
use crate::ports::{CategoryInfo, Platform};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const CHANNEL_TEXT: u8 = 0;
const CHANNEL_VOICE: u8 = 2;
const CHANNEL_CATEGORY: u8 = 4;

const OVERWRITE_ROLE: u8 = 0;
const OVERWRITE_MEMBER: u8 = 1;

const PERM_MANAGE_CHANNELS: u64 = 1 << 4;
const PERM_VIEW_CHANNEL: u64 = 1 << 10;
const PERM_CONNECT: u64 = 1 << 20;

const BUTTON_SUCCESS: u8 = 3;

#[derive(Debug, Deserialize)]
struct RawObject {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

fn parse_snowflake(raw: &str) -> PlatformResult<u64> {
    raw.parse::<u64>()
        .map_err(|e| PlatformError::Decode(format!("invalid snowflake '{}': {}", raw, e)))
}

/// Categories named `name` (ignoring case) with the number of channels parented to each
fn categories_with_counts(channels: &[RawChannel], name: &str) -> PlatformResult<Vec<CategoryInfo>> {
    channels
        .iter()
        .filter(|c| c.kind == CHANNEL_CATEGORY)
        .filter(|c| {
            c.name
                .as_deref()
                .map(|n| n.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
        .map(|category| {
            let channel_count = channels
                .iter()
                .filter(|c| c.parent_id.as_deref() == Some(category.id.as_str()))
                .count();
            Ok(CategoryInfo {
                id: ChannelId(parse_snowflake(&category.id)?),
                channel_count,
            })
        })
        .collect()
}

/// Team roles grant nothing on their own and stay out of mentions and the member list
fn role_payload(name: &str) -> Value {
    json!({
        "name": name,
        "permissions": "0",
        "mentionable": false,
        "hoist": false,
    })
}

fn message_payload(message: &DirectMessage) -> Value {
    let mut payload = json!({
        "embeds": [{
            "title": message.title.render_default(),
            "description": message.body.render_default(),
        }],
    });

    if let Some(control) = &message.control {
        payload["components"] = json!([{
            "type": 1,
            "components": [{
                "type": 2,
                "style": BUTTON_SUCCESS,
                "label": Notice::accept_label().render_default(),
                "custom_id": control.custom_id(),
            }],
        }]);
    }
    payload
}

/// Discord HTTP client
pub struct DiscordRest {
    client: Client,
    api_base: String,
    token: String,
    bot_user: OnceCell<UserId>,
}

impl DiscordRest {
    pub fn new(token: impl Into<String>, api_base: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gamejam/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            token: token.into(),
            bot_user: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bot {}", self.token))
    }

    async fn send_raw(&self, request: RequestBuilder) -> PlatformResult<reqwest::Response> {
        let resp = self.authorized(request).send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().await.unwrap_or_default();
            let retry_after_ms = serde_json::from_str::<RateLimitBody>(&body)
                .map(|b| (b.retry_after * 1000.0).ceil() as u64)
                .unwrap_or(1000);
            warn!("Discord rate limit hit, retry after {}ms", retry_after_ms);
            return Err(PlatformError::RateLimited { retry_after_ms });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Discord request failed: {} - {}", status, body);
            return Err(PlatformError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> PlatformResult<T> {
        let resp = self.send_raw(request).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> PlatformResult<()> {
        self.send_raw(request).await?;
        Ok(())
    }

    async fn bot_user(&self) -> PlatformResult<UserId> {
        self.bot_user
            .get_or_try_init(|| async {
                let me: RawObject = self
                    .send_json(self.client.get(self.url("/users/@me")))
                    .await?;
                Ok::<_, PlatformError>(UserId(parse_snowflake(&me.id)?))
            })
            .await
            .copied()
    }

    async fn create_channel(
        &self,
        community: CommunityId,
        kind: u8,
        category: Option<ChannelId>,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        let mut body = json!({ "name": name, "type": kind });
        if let Some(parent) = category {
            body["parent_id"] = json!(parent.to_string());
        }

        let created: RawObject = self
            .send_json(
                self.client
                    .post(self.url(&format!("/guilds/{}/channels", community)))
                    .json(&body),
            )
            .await?;
        let id = ChannelId(parse_snowflake(&created.id)?);
        debug!("Created channel {} ({}) type {}", name, id, kind);
        Ok(id)
    }

    async fn overwrite(
        &self,
        channel: ChannelId,
        target: u64,
        target_type: u8,
        allow: u64,
        deny: u64,
    ) -> PlatformResult<()> {
        self.send_empty(
            self.client
                .put(self.url(&format!("/channels/{}/permissions/{}", channel, target)))
                .json(&json!({
                    "type": target_type,
                    "allow": allow.to_string(),
                    "deny": deny.to_string(),
                })),
        )
        .await
    }
}

#[async_trait]
impl Platform for DiscordRest {
    #[instrument(skip(self))]
    async fn grant_role(
        &self,
        community: CommunityId,
        user: UserId,
        role: RoleId,
    ) -> PlatformResult<()> {
        self.send_empty(self.client.put(self.url(&format!(
            "/guilds/{}/members/{}/roles/{}",
            community, user, role
        ))))
        .await
    }

    #[instrument(skip(self))]
    async fn revoke_role(
        &self,
        community: CommunityId,
        user: UserId,
        role: RoleId,
    ) -> PlatformResult<()> {
        self.send_empty(self.client.delete(self.url(&format!(
            "/guilds/{}/members/{}/roles/{}",
            community, user, role
        ))))
        .await
    }

    #[instrument(skip(self))]
    async fn create_role(&self, community: CommunityId, name: &str) -> PlatformResult<RoleId> {
        let created: RawObject = self
            .send_json(
                self.client
                    .post(self.url(&format!("/guilds/{}/roles", community)))
                    .json(&role_payload(name)),
            )
            .await?;
        Ok(RoleId(parse_snowflake(&created.id)?))
    }

    async fn team_categories(
        &self,
        community: CommunityId,
        name: &str,
    ) -> PlatformResult<Vec<CategoryInfo>> {
        let channels: Vec<RawChannel> = self
            .send_json(
                self.client
                    .get(self.url(&format!("/guilds/{}/channels", community))),
            )
            .await?;
        categories_with_counts(&channels, name)
    }

    async fn create_category(
        &self,
        community: CommunityId,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        self.create_channel(community, CHANNEL_CATEGORY, None, name)
            .await
    }

    async fn create_text_channel(
        &self,
        community: CommunityId,
        category: Option<ChannelId>,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        self.create_channel(community, CHANNEL_TEXT, category, name)
            .await
    }

    async fn create_voice_channel(
        &self,
        community: CommunityId,
        category: Option<ChannelId>,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        self.create_channel(community, CHANNEL_VOICE, category, name)
            .await
    }

    #[instrument(skip(self))]
    async fn restrict_channel_to_role(
        &self,
        community: CommunityId,
        channel: ChannelId,
        role: RoleId,
    ) -> PlatformResult<()> {
        let bot = self.bot_user().await?;
        let visible = PERM_VIEW_CHANNEL | PERM_CONNECT;

        // @everyone shares the guild id
        self.overwrite(channel, community.0, OVERWRITE_ROLE, 0, visible)
            .await?;
        self.overwrite(channel, role.0, OVERWRITE_ROLE, visible, 0)
            .await?;
        self.overwrite(
            channel,
            bot.0,
            OVERWRITE_MEMBER,
            visible | PERM_MANAGE_CHANNELS,
            0,
        )
        .await
    }

    #[instrument(skip(self, message), fields(recipient = %message.recipient))]
    async fn send_direct_message(&self, message: &DirectMessage) -> PlatformResult<()> {
        let dm: RawObject = self
            .send_json(
                self.client
                    .post(self.url("/users/@me/channels"))
                    .json(&json!({ "recipient_id": message.recipient.to_string() })),
            )
            .await?;

        self.send_empty(
            self.client
                .post(self.url(&format!("/channels/{}/messages", dm.id)))
                .json(&message_payload(message)),
        )
        .await
    }

    #[instrument(skip(self, notice), fields(key = %notice.key))]
    async fn send_channel_message(
        &self,
        channel: ChannelId,
        notice: &Notice,
    ) -> PlatformResult<()> {
        self.send_empty(
            self.client
                .post(self.url(&format!("/channels/{}/messages", channel)))
                .json(&json!({ "content": notice.render_default() })),
        )
        .await
    }
}
