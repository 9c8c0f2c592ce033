use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{InviteId, JamId, TeamId};

/// Why a registration attempt fell outside the registration window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationClosed {
    /// Registration opens at the given instant
    NotYetOpen { opens_at: DateTime<Utc> },
    /// Registration window has already ended
    AlreadyClosed,
}

impl std::fmt::Display for RegistrationClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationClosed::NotYetOpen { opens_at } => {
                write!(f, "not yet open (opens at {})", opens_at.to_rfc3339())
            }
            RegistrationClosed::AlreadyClosed => write!(f, "already closed"),
        }
    }
}

/// Coarse classification used by callers to decide how to surface a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any mutation
    Validation,
    /// A business precondition did not hold (including lost races)
    Precondition,
    /// Storage or platform unavailable
    Infrastructure,
}

/// Main error type for the jam coordinator
#[derive(Error, Debug)]
pub enum JamError {
    // Validation errors
    #[error("Invalid window ordering: {0}")]
    InvalidWindowOrdering(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Lookup errors
    #[error("No upcoming or running jam")]
    NoActiveJam,

    #[error("Jam not found: {0}")]
    JamNotFound(JamId),

    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    #[error("Invite not found: {0}")]
    InviteNotFound(InviteId),

    // Registration preconditions
    #[error("Registration is {0}")]
    OutsideRegistrationWindow(RegistrationClosed),

    #[error("User is already registered for this jam")]
    AlreadyRegistered,

    // Team preconditions
    #[error("Voting is active")]
    VotingActive,

    #[error("User is not registered for this jam")]
    NotRegistered,

    #[error("User is already part of a team")]
    AlreadyInTeam,

    #[error("Team name is already taken: {0}")]
    NameTaken(String),

    #[error("User has no team")]
    NoTeam,

    #[error("Only the team leader can do this")]
    NotLeader,

    #[error("Team is full (max {max} members)")]
    TeamFull { max: u32 },

    #[error("Invited user is not registered for this jam")]
    InviteeNotRegistered,

    #[error("Invited user is already part of a team")]
    InviteeAlreadyTeamed,

    #[error("The jam has not started yet (starts at {starts_at})")]
    JamNotStarted { starts_at: DateTime<Utc> },

    // Invite handshake
    #[error("Invite has expired")]
    InviteExpired,

    #[error("Invite was cancelled")]
    InviteCancelled,

    #[error("The jam is over")]
    JamEnded,

    // Infrastructure errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for JamError
pub type Result<T> = std::result::Result<T, JamError>;

impl JamError {
    pub fn kind(&self) -> ErrorKind {
        use JamError::*;

        match self {
            InvalidWindowOrdering(_) | InvalidInput(_) => ErrorKind::Validation,
            NoActiveJam
            | JamNotFound(_)
            | TeamNotFound(_)
            | InviteNotFound(_)
            | OutsideRegistrationWindow(_)
            | AlreadyRegistered
            | VotingActive
            | NotRegistered
            | AlreadyInTeam
            | NameTaken(_)
            | NoTeam
            | NotLeader
            | TeamFull { .. }
            | InviteeNotRegistered
            | InviteeAlreadyTeamed
            | JamNotStarted { .. }
            | InviteExpired
            | InviteCancelled
            | JamEnded => ErrorKind::Precondition,
            Config(_) | Database(_) | Migration(_) | Platform(_) | Json(_) | Io(_)
            | Internal(_) => ErrorKind::Infrastructure,
        }
    }

    /// Localization key the command layer renders for the acting user
    pub fn message_key(&self) -> &'static str {
        use JamError::*;

        match self {
            InvalidWindowOrdering(_) => "command.jamadmin.create.message.invalidwindows",
            InvalidInput(_) => "error.invalidinput",
            NoActiveJam => "command.team.message.nojamactive",
            JamNotFound(_) => "error.noUpcomingJam",
            TeamNotFound(_) => "error.noteam",
            InviteNotFound(_) => "command.team.invite.gameJamOver",
            OutsideRegistrationWindow(RegistrationClosed::NotYetOpen { .. }) => {
                "command.register.notYet"
            }
            OutsideRegistrationWindow(RegistrationClosed::AlreadyClosed) => {
                "command.register.notAnymore"
            }
            AlreadyRegistered => "command.register.alreadyRegistered",
            VotingActive => "error.votingactive",
            NotRegistered => "command.team.create.message.unregistered",
            AlreadyInTeam => "command.team.invite.alreadyMember",
            NameTaken(_) => "command.team.create.message.nametaken",
            NoTeam => "error.noteam",
            NotLeader => "command.team.invite.message.noleader",
            TeamFull { .. } => "error.maxteamsize",
            InviteeNotRegistered => "command.team.invite.message.notRegistered",
            InviteeAlreadyTeamed => "command.team.invite.message.partofteam",
            JamNotStarted { .. } => "command.team.message.jamNotStarted",
            InviteExpired => "command.team.invite.expired",
            InviteCancelled => "command.team.invite.cancelled",
            JamEnded => "command.team.invite.gameJamOver",
            Config(_) | Database(_) | Migration(_) | Platform(_) | Json(_) | Io(_)
            | Internal(_) => "error.internal",
        }
    }

    pub fn is_user_facing(&self) -> bool {
        self.kind() != ErrorKind::Infrastructure
    }
}

/// Errors raised by the chat platform adapter
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Platform returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PlatformError::Decode(err.to_string())
        } else {
            PlatformError::Http(err.to_string())
        }
    }
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;
