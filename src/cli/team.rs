//! Team formation commands
//!
//! gamejam team create   - Create a team led by a registered user
//! gamejam team show     - Show a team by member or by name
//! gamejam team invite   - Invite a registered user into the leader's team
//! gamejam team accept   - Accept an invite by id
//! gamejam team control  - Route a pressed acceptance control

use anyhow::{bail, Result};
use clap::Subcommand;
use uuid::Uuid;

use crate::context::AppContext;
use crate::domain::{CommunityId, InviteId, Membership, Team, UserId};

#[derive(Subcommand, Debug)]
pub enum TeamCommands {
    /// Create a team; the leader must be registered and teamless
    Create {
        /// Leader user id
        leader: u64,
        /// Team name
        name: String,
    },

    /// Show a team by member or by name
    Show {
        /// Any member of the team
        #[arg(long, conflicts_with = "name")]
        user: Option<u64>,
        /// Exact team name
        #[arg(long)]
        name: Option<String>,
    },

    /// Invite a user into the inviter's team
    Invite {
        inviter: u64,
        invitee: u64,
    },

    /// Accept an invite
    Accept {
        invite: Uuid,
    },

    /// Handle an acceptance control id (`jam-invite:<uuid>`)
    Control {
        custom_id: String,
    },
}

impl TeamCommands {
    pub async fn run(self, ctx: &AppContext, community: CommunityId) -> Result<()> {
        match self {
            Self::Create { leader, name } => {
                let jam = ctx.jams.require_current(community).await?;
                let team = ctx.teams.create_team(jam.id, UserId(leader), &name).await?;
                println!("\x1b[32m✓ Team \"{}\" created ({})\x1b[0m", team.name, team.id);
                print_team(&team);
                Ok(())
            }
            Self::Show { user, name } => {
                let jam = ctx.jams.require_current(community).await?;
                let team = match (user, name) {
                    (Some(user), _) => ctx.teams.team_of(jam.id, UserId(user)).await?,
                    (None, Some(name)) => ctx.teams.by_name(jam.id, &name).await?,
                    (None, None) => bail!("pass --user or --name"),
                };
                match team {
                    Some(team) => print_team(&team),
                    None => println!("No such team"),
                }
                Ok(())
            }
            Self::Invite { inviter, invitee } => {
                let jam = ctx.jams.require_current(community).await?;
                let invite = ctx
                    .invites
                    .invite(jam.id, UserId(inviter), UserId(invitee))
                    .await?;
                println!("\x1b[32m✓ Invite {} sent to {}\x1b[0m", invite.id, invite.invitee);
                Ok(())
            }
            Self::Accept { invite } => {
                let membership = ctx.invites.accept(InviteId(invite)).await?;
                print_membership(&membership);
                Ok(())
            }
            Self::Control { custom_id } => {
                let membership = ctx.invites.handle_control(&custom_id).await?;
                print_membership(&membership);
                Ok(())
            }
        }
    }
}

fn print_team(team: &Team) {
    println!("  Team:    {} ({})", team.name, team.id);
    println!("  Leader:  {}", team.leader);
    println!("  Role:    {}", team.role);
    println!("  Text:    {}", team.text_channel);
    println!("  Voice:   {}", team.voice_channel);
    let members: Vec<String> = team.members.iter().map(|m| m.to_string()).collect();
    println!("  Members: {}", members.join(", "));
}

fn print_membership(membership: &Membership) {
    println!(
        "\x1b[32m✓ {} is a member of team {}\x1b[0m",
        membership.user, membership.team
    );
}
