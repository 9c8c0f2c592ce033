use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::JamConfig;
use crate::coordination::{SideEffect, SideEffectQueue};
use crate::domain::{
    text_channel_name, validate_team_name, ChannelId, Clock, CommunityId, JamId, NewTeam, RoleId,
    Team, TeamId, UserId,
};
use crate::error::{JamError, Result};
use crate::ports::{JamStore, LockKey, Platform};

/// Platform resources created for a new team
struct Provisioned {
    role: RoleId,
    text_channel: ChannelId,
    voice_channel: ChannelId,
}

/// Team creation and lookups
#[derive(Clone)]
pub struct TeamRegistry {
    store: Arc<dyn JamStore>,
    platform: Arc<dyn Platform>,
    effects: Arc<SideEffectQueue>,
    clock: Arc<dyn Clock>,
    team_category: String,
    category_capacity: usize,
}

impl TeamRegistry {
    pub fn new(
        store: Arc<dyn JamStore>,
        platform: Arc<dyn Platform>,
        effects: Arc<SideEffectQueue>,
        clock: Arc<dyn Clock>,
        config: &JamConfig,
    ) -> Self {
        Self {
            store,
            platform,
            effects,
            clock,
            team_category: config.team_category.clone(),
            category_capacity: config.category_capacity,
        }
    }

    /// Create a team led by `leader`, provisioning its role and channels.
    ///
    /// The atomic scope stays open while the platform resources are created, so a
    /// racing request for the same leader or name waits and then fails its recheck.
    /// Any provisioning error abandons the scope and no team is stored. Teams can only be
    /// founded while the jam's active window is open.
    #[instrument(skip(self))]
    pub async fn create_team(&self, jam: JamId, leader: UserId, name: &str) -> Result<Team> {
        let current = self
            .store
            .load_jam(jam)
            .await?
            .ok_or(JamError::JamNotFound(jam))?;

        if current.is_voting() {
            return Err(JamError::VotingActive);
        }
        current.check_team_formation(self.clock.now())?;
        let name = validate_team_name(name)?;
        if !current.is_registered(leader) {
            return Err(JamError::NotRegistered);
        }

        let mut scope = self
            .store
            .begin(vec![
                LockKey::Member { jam, user: leader },
                LockKey::TeamName {
                    jam,
                    name: name.clone(),
                },
            ])
            .await?;

        // registration may have been withdrawn since the first read
        let locked = scope.load_jam(jam).await?.ok_or(JamError::JamNotFound(jam))?;
        if !locked.is_registered(leader) {
            return Err(JamError::NotRegistered);
        }
        if scope.team_of(jam, leader).await?.is_some() {
            return Err(JamError::AlreadyInTeam);
        }
        if scope.team_by_name(jam, &name).await?.is_some() {
            debug!("Team name '{}' already taken in jam {}", name, jam);
            return Err(JamError::NameTaken(name));
        }

        let provisioned = match self.provision(current.community, &name).await {
            Ok(provisioned) => provisioned,
            Err(e) => {
                warn!("Provisioning team '{}' failed: {}", name, e);
                return Err(e);
            }
        };

        let team = scope
            .insert_team(&NewTeam {
                jam,
                name,
                leader,
                role: provisioned.role,
                text_channel: provisioned.text_channel,
                voice_channel: provisioned.voice_channel,
            })
            .await?;
        scope.commit().await?;

        info!(
            "Created team {} '{}' in jam {} led by {}",
            team.id, team.name, jam, leader
        );
        self.effects.submit(SideEffect::GrantRole {
            community: current.community,
            user: leader,
            role: team.role,
        });
        Ok(team)
    }

    async fn provision(&self, community: CommunityId, name: &str) -> Result<Provisioned> {
        let category = self.pick_category(community).await?;
        let role = self.platform.create_role(community, name).await?;
        let text_channel = self
            .platform
            .create_text_channel(community, Some(category), &text_channel_name(name))
            .await?;
        let voice_channel = self
            .platform
            .create_voice_channel(community, Some(category), name)
            .await?;

        self.platform
            .restrict_channel_to_role(community, text_channel, role)
            .await?;
        self.platform
            .restrict_channel_to_role(community, voice_channel, role)
            .await?;

        Ok(Provisioned {
            role,
            text_channel,
            voice_channel,
        })
    }

    /// First team category with room for more channels, or a fresh one
    async fn pick_category(&self, community: CommunityId) -> Result<ChannelId> {
        let categories = self
            .platform
            .team_categories(community, &self.team_category)
            .await?;

        if let Some(free) = categories
            .iter()
            .find(|c| c.channel_count < self.category_capacity)
        {
            return Ok(free.id);
        }

        debug!(
            "All {} '{}' categories are full, creating another",
            categories.len(),
            self.team_category
        );
        Ok(self
            .platform
            .create_category(community, &self.team_category)
            .await?)
    }

    pub async fn team_of(&self, jam: JamId, user: UserId) -> Result<Option<Team>> {
        self.store.find_team_by_member(jam, user).await
    }

    /// Exact, case-sensitive lookup
    pub async fn by_name(&self, jam: JamId, name: &str) -> Result<Option<Team>> {
        self.store.find_team_by_name(jam, name.trim()).await
    }

    pub async fn members_of(&self, team: TeamId) -> Result<BTreeSet<UserId>> {
        self.store.team_members(team).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::{JamWindows, ManualClock, NewJam, TimeWindow};
    use crate::error::PlatformError;
    use crate::ports::{CategoryInfo, MockPlatform};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use mockall::predicate::{always, eq, function};
    use std::time::Duration as StdDuration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap()
    }

    /// Registration [t0, t0+1d), jam [t0+1d, t0+3d), voting [t0+3d, t0+5d)
    async fn jam_with(store: &MemoryStore, registered: &[u64]) -> JamId {
        let now = t0();
        let jam = store
            .insert_jam(&NewJam {
                community: CommunityId(1),
                topic: "Topic".to_string(),
                tagline: String::new(),
                timezone: "UTC".to_string(),
                windows: JamWindows::new(
                    TimeWindow::new(now - Duration::days(1), now + Duration::days(1)).unwrap(),
                    TimeWindow::new(now + Duration::days(1), now + Duration::days(3)).unwrap(),
                    TimeWindow::new(now + Duration::days(3), now + Duration::days(5)).unwrap(),
                )
                .unwrap(),
            })
            .await
            .unwrap();
        for user in registered {
            store.add_registration(jam.id, UserId(*user)).await.unwrap();
        }
        jam.id
    }

    fn provisioning_platform() -> MockPlatform {
        let mut platform = MockPlatform::new();
        platform.expect_team_categories().returning(|_, _| Ok(vec![]));
        platform
            .expect_create_category()
            .returning(|_, _| Ok(ChannelId(500)));
        platform
            .expect_create_role()
            .returning(|_, _| Ok(RoleId(100)));
        platform
            .expect_create_text_channel()
            .returning(|_, _, _| Ok(ChannelId(200)));
        platform
            .expect_create_voice_channel()
            .returning(|_, _, _| Ok(ChannelId(300)));
        platform
            .expect_restrict_channel_to_role()
            .returning(|_, _, _| Ok(()));
        platform.expect_grant_role().returning(|_, _, _| Ok(()));
        platform
    }

    fn registry(store: Arc<MemoryStore>, platform: MockPlatform) -> TeamRegistry {
        registry_at(store, platform, Arc::new(ManualClock::new(t0() + Duration::days(2))))
    }

    fn registry_at(
        store: Arc<MemoryStore>,
        platform: MockPlatform,
        clock: Arc<ManualClock>,
    ) -> TeamRegistry {
        let platform: Arc<dyn Platform> = Arc::new(platform);
        let effects = Arc::new(SideEffectQueue::spawn(
            platform.clone(),
            StdDuration::from_secs(1),
        ));
        TeamRegistry::new(store, platform, effects, clock, &JamConfig::default())
    }

    #[tokio::test]
    async fn creates_team_with_leader_as_only_member() {
        let store = Arc::new(MemoryStore::new());
        let jam = jam_with(&store, &[10]).await;
        let teams = registry(store.clone(), provisioning_platform());

        let team = teams.create_team(jam, UserId(10), " Alpha ").await.unwrap();
        assert_eq!(team.name, "Alpha");
        assert_eq!(team.role, RoleId(100));
        assert_eq!(team.text_channel, ChannelId(200));
        assert_eq!(team.voice_channel, ChannelId(300));
        assert_eq!(
            teams.members_of(team.id).await.unwrap(),
            BTreeSet::from([UserId(10)])
        );
        assert_eq!(
            teams.team_of(jam, UserId(10)).await.unwrap().unwrap().id,
            team.id
        );
        assert!(teams.by_name(jam, "alpha").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn uses_category_with_room() {
        let store = Arc::new(MemoryStore::new());
        let jam = jam_with(&store, &[10]).await;

        let mut platform = MockPlatform::new();
        platform.expect_team_categories().returning(|_, _| {
            Ok(vec![
                CategoryInfo {
                    id: ChannelId(1),
                    channel_count: 48,
                },
                CategoryInfo {
                    id: ChannelId(2),
                    channel_count: 3,
                },
            ])
        });
        platform.expect_create_category().never();
        platform
            .expect_create_role()
            .with(eq(CommunityId(1)), function(|name: &str| name == "Pixel Pushers"))
            .returning(|_, _| Ok(RoleId(100)));
        platform
            .expect_create_text_channel()
            .with(
                always(),
                eq(Some(ChannelId(2))),
                function(|name: &str| name == "pixel-pushers"),
            )
            .returning(|_, _, _| Ok(ChannelId(200)));
        platform
            .expect_create_voice_channel()
            .with(
                always(),
                eq(Some(ChannelId(2))),
                function(|name: &str| name == "Pixel Pushers"),
            )
            .returning(|_, _, _| Ok(ChannelId(300)));
        platform
            .expect_restrict_channel_to_role()
            .times(2)
            .returning(|_, _, _| Ok(()));
        platform.expect_grant_role().returning(|_, _, _| Ok(()));

        let teams = registry(store, platform);
        teams
            .create_team(jam, UserId(10), "Pixel Pushers")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn full_categories_trigger_a_new_one() {
        let store = Arc::new(MemoryStore::new());
        let jam = jam_with(&store, &[10]).await;

        let mut platform = MockPlatform::new();
        platform
            .expect_team_categories()
            .returning(|_, _| {
                Ok(vec![CategoryInfo {
                    id: ChannelId(1),
                    channel_count: 48,
                }])
            });
        platform
            .expect_create_category()
            .times(1)
            .returning(|_, _| Ok(ChannelId(500)));
        platform
            .expect_create_role()
            .returning(|_, _| Ok(RoleId(100)));
        platform
            .expect_create_text_channel()
            .with(always(), eq(Some(ChannelId(500))), always())
            .returning(|_, _, _| Ok(ChannelId(200)));
        platform
            .expect_create_voice_channel()
            .with(always(), eq(Some(ChannelId(500))), always())
            .returning(|_, _, _| Ok(ChannelId(300)));
        platform
            .expect_restrict_channel_to_role()
            .returning(|_, _, _| Ok(()));
        platform.expect_grant_role().returning(|_, _, _| Ok(()));

        let teams = registry(store, platform);
        teams.create_team(jam, UserId(10), "Alpha").await.unwrap();
    }

    #[tokio::test]
    async fn preconditions_are_checked_in_order() {
        let store = Arc::new(MemoryStore::new());
        let jam = jam_with(&store, &[10, 11]).await;
        let teams = registry(store.clone(), provisioning_platform());

        assert!(matches!(
            teams.create_team(jam, UserId(99), "Alpha").await,
            Err(JamError::NotRegistered)
        ));
        assert!(matches!(
            teams.create_team(jam, UserId(10), "   ").await,
            Err(JamError::InvalidInput(_))
        ));

        teams.create_team(jam, UserId(10), "Alpha").await.unwrap();
        assert!(matches!(
            teams.create_team(jam, UserId(10), "Beta").await,
            Err(JamError::AlreadyInTeam)
        ));
        assert!(matches!(
            teams.create_team(jam, UserId(11), "Alpha").await,
            Err(JamError::NameTaken(_))
        ));
        // case-sensitive
        teams.create_team(jam, UserId(11), "alpha").await.unwrap();

        store.set_voting(jam, true).await.unwrap();
        assert!(matches!(
            teams.create_team(jam, UserId(10), "Gamma").await,
            Err(JamError::VotingActive)
        ));
    }

    #[tokio::test]
    async fn provisioning_failure_stores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let jam = jam_with(&store, &[10]).await;

        let mut platform = MockPlatform::new();
        platform.expect_team_categories().returning(|_, _| Ok(vec![]));
        platform
            .expect_create_category()
            .returning(|_, _| Ok(ChannelId(500)));
        platform
            .expect_create_role()
            .returning(|_, _| Ok(RoleId(100)));
        platform
            .expect_create_text_channel()
            .returning(|_, _, _| Err(PlatformError::Status {
                status: 403,
                body: "Missing Permissions".to_string(),
            }));
        platform.expect_grant_role().never();

        let teams = registry(store.clone(), platform);
        assert!(matches!(
            teams.create_team(jam, UserId(10), "Alpha").await,
            Err(JamError::Platform(_))
        ));
        assert!(teams.team_of(jam, UserId(10)).await.unwrap().is_none());
        assert!(teams.by_name(jam, "Alpha").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn teams_form_only_inside_the_active_window() {
        let store = Arc::new(MemoryStore::new());
        let jam = jam_with(&store, &[10]).await;
        let clock = Arc::new(ManualClock::new(t0() + Duration::hours(12)));

        let mut platform = MockPlatform::new();
        platform.expect_create_role().never();
        let teams = registry_at(store.clone(), platform, clock.clone());

        assert!(matches!(
            teams.create_team(jam, UserId(10), "Alpha").await,
            Err(JamError::JamNotStarted { starts_at }) if starts_at == t0() + Duration::days(1)
        ));

        clock.set(t0() + Duration::days(3));
        assert!(matches!(
            teams.create_team(jam, UserId(10), "Alpha").await,
            Err(JamError::JamEnded)
        ));

        clock.set(t0() + Duration::days(6));
        assert!(matches!(
            teams.create_team(jam, UserId(10), "Alpha").await,
            Err(JamError::JamEnded)
        ));
        assert!(teams.team_of(jam, UserId(10)).await.unwrap().is_none());
    }
}
