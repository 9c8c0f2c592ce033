//! Shared fixtures for integration tests: a recording platform, a manual clock and a
//! context wired over the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use gamejam::config::AppConfig;
use gamejam::error::{PlatformError, PlatformResult};
use gamejam::{
    AppContext, CategoryInfo, ChannelId, CommunityId, DirectMessage, Jam, JamWindows,
    ManualClock, MemoryStore, NewJam, Notice, Platform, RoleId, TimeWindow, UserId,
};

pub const COMMUNITY: CommunityId = CommunityId(1);

/// One observed platform call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GrantRole { user: UserId, role: RoleId },
    RevokeRole { user: UserId, role: RoleId },
    CreateRole(String),
    CreateCategory(String),
    CreateText(String),
    CreateVoice(String),
    Restrict { channel: ChannelId, role: RoleId },
    DirectMessage(DirectMessage),
    ChannelMessage { channel: ChannelId, notice: Notice },
}

/// Records every call and fails the operations named in `fail`
#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<Call>>,
    fail: Mutex<HashSet<&'static str>>,
    next_id: AtomicU64,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1_000),
            ..Default::default()
        }
    }

    pub fn fail_on(&self, operation: &'static str) {
        self.fail.lock().unwrap().insert(operation);
    }

    pub fn heal(&self) {
        self.fail.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn direct_messages(&self) -> Vec<DirectMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DirectMessage(dm) => Some(dm),
                _ => None,
            })
            .collect()
    }

    pub fn grants_to(&self, user: UserId) -> Vec<RoleId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::GrantRole { user: u, role } if u == user => Some(role),
                _ => None,
            })
            .collect()
    }

    fn record(&self, operation: &'static str, call: Call) -> PlatformResult<()> {
        if self.fail.lock().unwrap().contains(operation) {
            return Err(PlatformError::Status {
                status: 503,
                body: format!("{} unavailable", operation),
            });
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn grant_role(
        &self,
        _community: CommunityId,
        user: UserId,
        role: RoleId,
    ) -> PlatformResult<()> {
        self.record("grant_role", Call::GrantRole { user, role })
    }

    async fn revoke_role(
        &self,
        _community: CommunityId,
        user: UserId,
        role: RoleId,
    ) -> PlatformResult<()> {
        self.record("revoke_role", Call::RevokeRole { user, role })
    }

    async fn create_role(&self, _community: CommunityId, name: &str) -> PlatformResult<RoleId> {
        self.record("create_role", Call::CreateRole(name.to_string()))?;
        Ok(RoleId(self.id()))
    }

    async fn team_categories(
        &self,
        _community: CommunityId,
        _name: &str,
    ) -> PlatformResult<Vec<CategoryInfo>> {
        Ok(Vec::new())
    }

    async fn create_category(
        &self,
        _community: CommunityId,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        self.record("create_category", Call::CreateCategory(name.to_string()))?;
        Ok(ChannelId(self.id()))
    }

    async fn create_text_channel(
        &self,
        _community: CommunityId,
        _category: Option<ChannelId>,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        self.record("create_text_channel", Call::CreateText(name.to_string()))?;
        Ok(ChannelId(self.id()))
    }

    async fn create_voice_channel(
        &self,
        _community: CommunityId,
        _category: Option<ChannelId>,
        name: &str,
    ) -> PlatformResult<ChannelId> {
        self.record("create_voice_channel", Call::CreateVoice(name.to_string()))?;
        Ok(ChannelId(self.id()))
    }

    async fn restrict_channel_to_role(
        &self,
        _community: CommunityId,
        channel: ChannelId,
        role: RoleId,
    ) -> PlatformResult<()> {
        self.record("restrict_channel_to_role", Call::Restrict { channel, role })
    }

    async fn send_direct_message(&self, message: &DirectMessage) -> PlatformResult<()> {
        self.record("send_direct_message", Call::DirectMessage(message.clone()))
    }

    async fn send_channel_message(
        &self,
        channel: ChannelId,
        notice: &Notice,
    ) -> PlatformResult<()> {
        self.record(
            "send_channel_message",
            Call::ChannelMessage {
                channel,
                notice: notice.clone(),
            },
        )
    }
}

/// Registration opens at `t0()`; the jam runs days 7-9, voting days 9-12.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

pub fn windows() -> JamWindows {
    let t0 = t0();
    JamWindows::new(
        TimeWindow::new(t0, t0 + Duration::days(7)).unwrap(),
        TimeWindow::new(t0 + Duration::days(7), t0 + Duration::days(9)).unwrap(),
        TimeWindow::new(t0 + Duration::days(9), t0 + Duration::days(12)).unwrap(),
    )
    .unwrap()
}

pub struct Harness {
    pub ctx: AppContext,
    pub store: Arc<MemoryStore>,
    pub platform: Arc<RecordingPlatform>,
    pub clock: Arc<ManualClock>,
    pub jam: Jam,
}

impl Harness {
    /// A jam in its registration window with the given team size
    pub async fn new(team_size: u32) -> Self {
        Self::with_config(team_size, AppConfig::default()).await
    }

    pub async fn with_config(team_size: u32, config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(RecordingPlatform::new());
        let clock = Arc::new(ManualClock::new(t0() + Duration::hours(1)));
        let ctx = AppContext::new(
            config,
            store.clone(),
            platform.clone(),
            clock.clone(),
        );

        ctx.settings
            .set_team_size(COMMUNITY, team_size)
            .await
            .unwrap();
        let jam = ctx
            .jams
            .create(NewJam {
                community: COMMUNITY,
                topic: "Gravity".to_string(),
                tagline: "What goes up".to_string(),
                timezone: "Europe/Berlin".to_string(),
                windows: windows(),
            })
            .await
            .unwrap();

        Self {
            ctx,
            store,
            platform,
            clock,
            jam,
        }
    }

    pub async fn register_all(&self, users: &[u64]) {
        for user in users {
            self.ctx
                .registrations
                .register(self.jam.id, UserId(*user))
                .await
                .unwrap();
        }
    }

    /// Move the clock an hour into the jam's active window, where teams form
    pub fn start_building(&self) {
        self.clock.set(self.jam.windows.active().start() + Duration::hours(1));
    }

    /// Let queued side effects drain
    pub async fn settle(&self) {
        self.ctx.effects.wait_idle().await;
    }
}
