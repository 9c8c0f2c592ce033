pub mod adapters;
pub mod cli;
pub mod config;
pub mod context;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod jam;
pub mod logging;
pub mod ports;

pub use adapters::{DiscordRest, DryRunPlatform, MemoryStore, PostgresStore};
pub use config::AppConfig;
pub use context::AppContext;
pub use coordination::{SideEffect, SideEffectQueue, SideEffectStats};
pub use domain::{
    AcceptControl, ChannelId, Clock, CommunityId, DirectMessage, Invite, InviteId, InviteStatus,
    Jam, JamId, JamPhase, JamSettings, JamWindows, ManualClock, Membership, NewJam, Notice,
    RoleId, SystemClock, Team, TeamId, TimeWindow, UserId,
};
pub use error::{ErrorKind, JamError, PlatformError, RegistrationClosed, Result};
pub use jam::{
    InviteCoordinator, JamRegistry, Registration, RegistrationTracker, SettingsService,
    TeamRegistry, VoteGate,
};
pub use ports::{AtomicScope, CategoryInfo, JamStore, LockKey, Platform};
