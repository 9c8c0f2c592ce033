use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::{DiscordRest, DryRunPlatform, MemoryStore, PostgresStore};
use crate::config::AppConfig;
use crate::coordination::SideEffectQueue;
use crate::domain::{Clock, SystemClock};
use crate::error::Result;
use crate::jam::{
    InviteCoordinator, JamRegistry, RegistrationTracker, SettingsService, TeamRegistry, VoteGate,
};
use crate::ports::{JamStore, Platform};

/// Everything a command needs, wired once at startup and passed explicitly
#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<dyn JamStore>,
    pub platform: Arc<dyn Platform>,
    pub clock: Arc<dyn Clock>,
    pub effects: Arc<SideEffectQueue>,
    pub jams: JamRegistry,
    pub votes: VoteGate,
    pub settings: SettingsService,
    pub registrations: RegistrationTracker,
    pub teams: TeamRegistry,
    pub invites: InviteCoordinator,
}

impl AppContext {
    /// Wire services over explicit adapters. Must be called inside a tokio runtime.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn JamStore>,
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let effects = Arc::new(SideEffectQueue::spawn(
            platform.clone(),
            config.jam.side_effect_timeout(),
        ));
        let settings = SettingsService::new(store.clone(), config.jam.default_team_size);

        Self {
            jams: JamRegistry::new(store.clone(), clock.clone()),
            votes: VoteGate::new(store.clone()),
            registrations: RegistrationTracker::new(
                store.clone(),
                settings.clone(),
                clock.clone(),
                effects.clone(),
            ),
            teams: TeamRegistry::new(
                store.clone(),
                platform.clone(),
                effects.clone(),
                clock.clone(),
                &config.jam,
            ),
            invites: InviteCoordinator::new(
                store.clone(),
                settings.clone(),
                clock.clone(),
                effects.clone(),
                config.jam.invite_timeout(),
            ),
            settings,
            config,
            store,
            platform,
            clock,
            effects,
        }
    }

    /// Build adapters from configuration: Postgres when a database URL is set, memory
    /// otherwise; Discord when a token is set and dry run is off, logging otherwise.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn JamStore> = match &config.database.url {
            Some(url) => {
                let store = PostgresStore::new(url, config.database.max_connections).await?;
                store.migrate().await?;
                Arc::new(store)
            }
            None => {
                warn!("No database configured, state is kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };

        let platform: Arc<dyn Platform> = if config.is_dry_run() {
            info!("Platform calls are logged only (dry run)");
            Arc::new(DryRunPlatform::new())
        } else {
            Arc::new(DiscordRest::new(
                config.discord.token.clone().unwrap_or_default(),
                config.discord.api_base.clone(),
                Duration::from_secs(config.discord.request_timeout_secs),
            ))
        };

        Ok(Self::new(config, store, platform, Arc::new(SystemClock)))
    }

    /// Wait for queued side effects before the process exits
    pub async fn shutdown(&self) {
        self.effects.wait_idle().await;
        let stats = self.effects.stats();
        info!(
            "Side effects: {} submitted, {} succeeded, {} failed",
            stats.submitted, stats.succeeded, stats.failed
        );
    }
}
