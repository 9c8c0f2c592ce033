//! gamejam CLI
//!
//! Commands:
//! - `gamejam migrate` - Apply database migrations
//! - `gamejam jam` - Create and inspect jams, toggle voting
//! - `gamejam settings` - Per-community jam settings
//! - `gamejam register` - Register a user for the current jam
//! - `gamejam unregister` - Withdraw a teamless user from the current jam
//! - `gamejam team` - Create teams, invite and accept

pub mod jam;
pub mod settings;
pub mod team;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::context::AppContext;
use crate::domain::{CommunityId, UserId};

pub use jam::JamCommands;
pub use settings::SettingsCommands;
pub use team::TeamCommands;

/// Game jam coordinator
#[derive(Parser, Debug)]
#[command(name = "gamejam")]
#[command(author, version, about = "Game jam lifecycle and team formation coordinator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Community (guild) the command acts on
    #[arg(short, long, global = true, env = "GAMEJAM_COMMUNITY", default_value = "0")]
    pub community: u64,

    /// Directory holding default.toml and the per-environment overrides
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply database migrations and exit
    Migrate,

    /// Create and inspect jams
    #[command(subcommand)]
    Jam(JamCommands),

    /// Show or change community settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Register a user for the current jam
    Register {
        /// User id
        user: u64,
    },

    /// Withdraw a user from the current jam (not allowed once in a team)
    Unregister {
        /// User id
        user: u64,
    },

    /// Team formation
    #[command(subcommand)]
    Team(TeamCommands),
}

impl Cli {
    pub fn community(&self) -> CommunityId {
        CommunityId(self.community)
    }

    pub async fn run(self, ctx: &AppContext) -> Result<()> {
        let community = self.community();
        match self.command {
            // migrations already ran while the context was built
            Commands::Migrate => {
                if ctx.config.database.url.is_some() {
                    println!("\x1b[32m✓ Migrations applied\x1b[0m");
                } else {
                    println!("No database configured, nothing to migrate");
                }
                Ok(())
            }
            Commands::Jam(cmd) => cmd.run(ctx, community).await,
            Commands::Settings(cmd) => cmd.run(ctx, community).await,
            Commands::Register { user } => register(ctx, community, UserId(user)).await,
            Commands::Unregister { user } => {
                let jam = ctx.jams.require_current(community).await?;
                ctx.registrations.unregister(jam.id, UserId(user)).await?;
                println!("\x1b[32m✓ {} unregistered from \"{}\"\x1b[0m", UserId(user), jam.topic);
                Ok(())
            }
            Commands::Team(cmd) => cmd.run(ctx, community).await,
        }
    }
}

async fn register(ctx: &AppContext, community: CommunityId, user: UserId) -> Result<()> {
    let jam = ctx.jams.require_current(community).await?;
    let registration = ctx.registrations.register(jam.id, user).await?;

    println!("\x1b[32m✓ {} registered for \"{}\"\x1b[0m", user, jam.topic);
    println!(
        "  The jam starts at {}",
        registration.jam_starts_at.to_rfc3339()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_unregister() {
        let cli = Cli::parse_from(["gamejam", "unregister", "42"]);
        assert!(matches!(cli.command, Commands::Unregister { user: 42 }));
    }

    #[test]
    fn parses_nested_team_invite() {
        let cli = Cli::parse_from(["gamejam", "--community", "7", "team", "invite", "1", "2"]);
        assert_eq!(cli.community(), CommunityId(7));
        assert!(matches!(
            cli.command,
            Commands::Team(TeamCommands::Invite {
                inviter: 1,
                invitee: 2
            })
        ));
    }
}
