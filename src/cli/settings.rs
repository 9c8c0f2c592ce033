//! Community settings commands
//!
//! gamejam settings show       - Show the effective settings
//! gamejam settings jam-role   - Set or clear the role granted to registrants
//! gamejam settings team-size  - Set the maximum team size

use anyhow::Result;
use clap::Subcommand;

use crate::context::AppContext;
use crate::domain::{CommunityId, JamSettings, RoleId};

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show the effective settings
    Show,

    /// Set the role granted on registration; omit to clear it
    JamRole {
        role: Option<u64>,
    },

    /// Set the maximum number of members per team
    TeamSize {
        size: u32,
    },
}

impl SettingsCommands {
    pub async fn run(self, ctx: &AppContext, community: CommunityId) -> Result<()> {
        let settings = match self {
            Self::Show => ctx.settings.get(community).await?,
            Self::JamRole { role } => {
                ctx.settings
                    .set_jam_role(community, role.map(RoleId))
                    .await?
            }
            Self::TeamSize { size } => ctx.settings.set_team_size(community, size).await?,
        };
        print_settings(&settings);
        Ok(())
    }
}

fn print_settings(settings: &JamSettings) {
    println!("Settings for community {}", settings.community);
    match settings.jam_role {
        Some(role) => println!("  Jam role:  {}", role),
        None => println!("  Jam role:  (none)"),
    }
    println!("  Team size: {}", settings.team_size);
}
