//! Jam administration commands
//!
//! gamejam jam create   - Schedule a new jam
//! gamejam jam current  - Show the upcoming or running jam
//! gamejam jam votes    - Open or close voting

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};

use crate::context::AppContext;
use crate::domain::{CommunityId, JamWindows, NewJam, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VoteState {
    Open,
    Closed,
}

/// Jam-related commands
#[derive(Subcommand, Debug)]
pub enum JamCommands {
    /// Schedule a new jam (all times RFC 3339)
    Create {
        /// Jam topic
        #[arg(short, long)]
        topic: String,

        /// Short tagline shown with the topic
        #[arg(long, default_value = "")]
        tagline: String,

        /// IANA timezone name the schedule is announced in
        #[arg(long, default_value = "UTC")]
        timezone: String,

        #[arg(long)]
        registration_start: DateTime<Utc>,
        #[arg(long)]
        registration_end: DateTime<Utc>,
        #[arg(long)]
        jam_start: DateTime<Utc>,
        #[arg(long)]
        jam_end: DateTime<Utc>,
        #[arg(long)]
        voting_start: DateTime<Utc>,
        #[arg(long)]
        voting_end: DateTime<Utc>,
    },

    /// Show the upcoming or running jam
    Current,

    /// Open or close voting on the current jam
    Votes {
        #[arg(value_enum)]
        state: VoteState,
    },
}

impl JamCommands {
    pub async fn run(self, ctx: &AppContext, community: CommunityId) -> Result<()> {
        match self {
            Self::Create {
                topic,
                tagline,
                timezone,
                registration_start,
                registration_end,
                jam_start,
                jam_end,
                voting_start,
                voting_end,
            } => {
                let windows = JamWindows::new(
                    TimeWindow::new(registration_start, registration_end)?,
                    TimeWindow::new(jam_start, jam_end)?,
                    TimeWindow::new(voting_start, voting_end)?,
                )?;
                let jam = ctx
                    .jams
                    .create(NewJam {
                        community,
                        topic,
                        tagline,
                        timezone,
                        windows,
                    })
                    .await?;
                println!("\x1b[32m✓ Created jam {} \"{}\"\x1b[0m", jam.id, jam.topic);
                Ok(())
            }
            Self::Current => show_current(ctx, community).await,
            Self::Votes { state } => {
                let jam = ctx.jams.require_current(community).await?;
                let open = state == VoteState::Open;
                if ctx.votes.set_voting(jam.id, open).await? {
                    println!("\x1b[32m✓ Voting is now {}\x1b[0m", state_label(open));
                } else {
                    println!("Voting was already {}", state_label(open));
                }
                Ok(())
            }
        }
    }
}

fn state_label(open: bool) -> &'static str {
    if open {
        "open"
    } else {
        "closed"
    }
}

async fn show_current(ctx: &AppContext, community: CommunityId) -> Result<()> {
    let Some(jam) = ctx.jams.next_or_current(community).await? else {
        println!("No upcoming or running jam");
        return Ok(());
    };
    let w = &jam.windows;

    println!("\n\x1b[36mJam {}: {}\x1b[0m", jam.id, jam.topic);
    if !jam.tagline.is_empty() {
        println!("  {}", jam.tagline);
    }
    println!("  Phase:         {}", jam.phase(ctx.jams.now()).as_str());
    println!("  Voting:        {}", state_label(jam.is_voting()));
    println!("  Registrations: {}", jam.registrations.len());
    println!("  Timezone:      {}", jam.timezone);
    for (label, window) in [
        ("Registration", w.registration()),
        ("Jam", w.active()),
        ("Voting", w.voting()),
    ] {
        println!(
            "  {:<14} {} -> {}",
            format!("{}:", label),
            window.start().to_rfc3339(),
            window.end().to_rfc3339()
        );
    }
    Ok(())
}
