pub mod discord_rest;
pub mod dry_run;
pub mod memory;
pub mod postgres;

pub use discord_rest::DiscordRest;
pub use dry_run::DryRunPlatform;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
