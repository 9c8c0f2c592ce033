//! Jam lifecycle services: scheduling, registration, teams, invites, voting and settings

pub mod invites;
pub mod registration;
pub mod registry;
pub mod settings;
pub mod teams;

pub use invites::InviteCoordinator;
pub use registration::{Registration, RegistrationTracker};
pub use registry::{JamRegistry, VoteGate};
pub use settings::SettingsService;
pub use teams::TeamRegistry;
