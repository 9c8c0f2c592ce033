use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{CommunityId, JamId, RoleId, UserId};
use super::window::{TimeWindow, WindowPosition};
use crate::error::{JamError, Result};

/// Team size used until an administrator configures one
pub const DEFAULT_TEAM_SIZE: u32 = 4;

/// The three scheduled windows of a jam.
///
/// Only constructible through [`JamWindows::new`] (or deserialization, which runs the
/// same check), so `registration.end <= active.start <= active.end <= voting.start`
/// always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawJamWindows")]
pub struct JamWindows {
    registration: TimeWindow,
    active: TimeWindow,
    voting: TimeWindow,
}

#[derive(Deserialize)]
struct RawJamWindows {
    registration: TimeWindow,
    active: TimeWindow,
    voting: TimeWindow,
}

impl TryFrom<RawJamWindows> for JamWindows {
    type Error = JamError;

    fn try_from(raw: RawJamWindows) -> Result<Self> {
        JamWindows::new(raw.registration, raw.active, raw.voting)
    }
}

impl JamWindows {
    pub fn new(registration: TimeWindow, active: TimeWindow, voting: TimeWindow) -> Result<Self> {
        let windows = Self {
            registration,
            active,
            voting,
        };
        windows.check()?;
        Ok(windows)
    }

    pub fn registration(&self) -> TimeWindow {
        self.registration
    }

    pub fn active(&self) -> TimeWindow {
        self.active
    }

    pub fn voting(&self) -> TimeWindow {
        self.voting
    }

    /// Skips the ordering check, so callers downstream can be shown to re-verify it
    #[cfg(test)]
    pub(crate) fn unchecked(registration: TimeWindow, active: TimeWindow, voting: TimeWindow) -> Self {
        Self {
            registration,
            active,
            voting,
        }
    }

    /// Verify the ordering invariant
    pub fn check(&self) -> Result<()> {
        if !self.registration.precedes(&self.active) {
            return Err(JamError::InvalidWindowOrdering(format!(
                "registration ends at {} but the jam starts at {}",
                self.registration.end().to_rfc3339(),
                self.active.start().to_rfc3339()
            )));
        }
        if !self.active.precedes(&self.voting) {
            return Err(JamError::InvalidWindowOrdering(format!(
                "the jam ends at {} but voting starts at {}",
                self.active.end().to_rfc3339(),
                self.voting.start().to_rfc3339()
            )));
        }
        Ok(())
    }
}

/// Lifecycle phase derived from the windows alone.
///
/// Voting is not a phase; it is the explicit flag on [`Jam`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JamPhase {
    /// Registration has not opened yet
    Upcoming,
    Registration,
    /// Registration closed, building not started
    Intermission,
    Active,
    /// Building is over, voting window not yet finished
    Judging,
    Ended,
}

impl JamPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JamPhase::Upcoming => "upcoming",
            JamPhase::Registration => "registration",
            JamPhase::Intermission => "intermission",
            JamPhase::Active => "active",
            JamPhase::Judging => "judging",
            JamPhase::Ended => "ended",
        }
    }
}

impl std::fmt::Display for JamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything an administrator supplies to schedule a jam
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJam {
    pub community: CommunityId,
    pub topic: String,
    pub tagline: String,
    pub timezone: String,
    pub windows: JamWindows,
}

impl NewJam {
    pub fn validate(&self) -> Result<()> {
        self.windows.check()?;
        if self.topic.trim().is_empty() {
            return Err(JamError::InvalidInput("topic must not be empty".to_string()));
        }
        let tz = self.timezone.trim();
        if tz.is_empty() || tz.chars().any(char::is_whitespace) {
            return Err(JamError::InvalidInput(format!(
                "invalid timezone '{}'",
                self.timezone
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jam {
    pub id: JamId,
    pub community: CommunityId,
    pub topic: String,
    pub tagline: String,
    pub timezone: String,
    pub windows: JamWindows,
    pub voting_open: bool,
    pub registrations: BTreeSet<UserId>,
}

impl Jam {
    pub fn phase(&self, now: DateTime<Utc>) -> JamPhase {
        let w = &self.windows;
        if now < w.registration().start() {
            JamPhase::Upcoming
        } else if w.registration().contains(now) {
            JamPhase::Registration
        } else if now < w.active().start() {
            JamPhase::Intermission
        } else if w.active().contains(now) {
            JamPhase::Active
        } else if now < w.voting().end() {
            JamPhase::Judging
        } else {
            JamPhase::Ended
        }
    }

    /// Reads the explicit flag, never the voting window
    pub fn is_voting(&self) -> bool {
        self.voting_open
    }

    pub fn is_registered(&self, user: UserId) -> bool {
        self.registrations.contains(&user)
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.windows.voting().has_ended(now)
    }

    /// Teams are created and joined only while the active window is open
    pub fn check_team_formation(&self, now: DateTime<Utc>) -> Result<()> {
        let active = self.windows.active();
        match active.position(now) {
            WindowPosition::Before => Err(JamError::JamNotStarted {
                starts_at: active.start(),
            }),
            WindowPosition::Inside => Ok(()),
            WindowPosition::After => Err(JamError::JamEnded),
        }
    }
}

/// Per-community jam settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JamSettings {
    pub community: CommunityId,
    /// Role granted to registrants
    pub jam_role: Option<RoleId>,
    pub team_size: u32,
}

impl JamSettings {
    pub fn defaults(community: CommunityId, team_size: u32) -> Self {
        Self {
            community,
            jam_role: None,
            team_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 6, day, hour, 0, 0).unwrap()
    }

    fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> TimeWindow {
        TimeWindow::new(from, to).unwrap()
    }

    fn sample_jam() -> Jam {
        Jam {
            id: JamId(1),
            community: CommunityId(10),
            topic: "Tiny worlds".to_string(),
            tagline: "Make it small".to_string(),
            timezone: "Europe/Berlin".to_string(),
            windows: JamWindows::new(
                window(at(1, 0), at(3, 0)),
                window(at(4, 0), at(6, 0)),
                window(at(6, 0), at(8, 0)),
            )
            .unwrap(),
            voting_open: false,
            registrations: BTreeSet::new(),
        }
    }

    #[test]
    fn windows_must_be_ordered() {
        let overlapping = JamWindows::new(
            window(at(1, 0), at(5, 0)),
            window(at(4, 0), at(6, 0)),
            window(at(6, 0), at(8, 0)),
        );
        assert!(matches!(
            overlapping,
            Err(JamError::InvalidWindowOrdering(_))
        ));

        let voting_too_early = JamWindows::new(
            window(at(1, 0), at(3, 0)),
            window(at(4, 0), at(6, 0)),
            window(at(5, 0), at(8, 0)),
        );
        assert!(matches!(
            voting_too_early,
            Err(JamError::InvalidWindowOrdering(_))
        ));
    }

    #[test]
    fn phase_follows_windows() {
        let jam = sample_jam();

        assert_eq!(jam.phase(at(1, 0) - chrono::Duration::seconds(1)), JamPhase::Upcoming);
        assert_eq!(jam.phase(at(2, 0)), JamPhase::Registration);
        assert_eq!(jam.phase(at(3, 12)), JamPhase::Intermission);
        assert_eq!(jam.phase(at(5, 0)), JamPhase::Active);
        assert_eq!(jam.phase(at(7, 0)), JamPhase::Judging);
        assert_eq!(jam.phase(at(8, 0)), JamPhase::Ended);
    }

    #[test]
    fn voting_flag_is_independent_of_window() {
        let mut jam = sample_jam();
        assert_eq!(jam.phase(at(7, 0)), JamPhase::Judging);
        assert!(!jam.is_voting());

        jam.voting_open = true;
        assert!(jam.is_voting());
        assert_eq!(jam.phase(at(2, 0)), JamPhase::Registration);
    }

    #[test]
    fn new_jam_rejects_blank_topic_and_bad_timezone() {
        let jam = sample_jam();
        let mut draft = NewJam {
            community: jam.community,
            topic: "  ".to_string(),
            tagline: String::new(),
            timezone: "UTC".to_string(),
            windows: jam.windows,
        };
        assert!(matches!(draft.validate(), Err(JamError::InvalidInput(_))));

        draft.topic = "Topic".to_string();
        draft.timezone = "Europe / Berlin".to_string();
        assert!(matches!(draft.validate(), Err(JamError::InvalidInput(_))));

        draft.timezone = "Europe/Berlin".to_string();
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn deserializing_unordered_windows_fails() {
        let jam = sample_jam();
        let mut json = serde_json::to_value(jam.windows).unwrap();
        assert_eq!(
            serde_json::from_value::<JamWindows>(json.clone()).unwrap(),
            jam.windows
        );

        // swap the registration and voting windows
        let registration = json["registration"].clone();
        json["registration"] = json["voting"].clone();
        json["voting"] = registration;
        assert!(serde_json::from_value::<JamWindows>(json).is_err());
    }

    #[test]
    fn teams_form_only_while_the_jam_runs() {
        let jam = sample_jam();

        assert!(matches!(
            jam.check_team_formation(at(2, 0)),
            Err(JamError::JamNotStarted { starts_at }) if starts_at == at(4, 0)
        ));
        assert!(jam.check_team_formation(at(4, 0)).is_ok());
        assert!(matches!(
            jam.check_team_formation(at(6, 0)),
            Err(JamError::JamEnded)
        ));
        assert!(matches!(
            jam.check_team_formation(at(9, 0)),
            Err(JamError::JamEnded)
        ));
    }
}
