use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::domain::{Clock, CommunityId, Jam, JamId, NewJam};
use crate::error::{JamError, Result};
use crate::ports::JamStore;

/// Creates jams and finds the one a community is currently working on
#[derive(Clone)]
pub struct JamRegistry {
    store: Arc<dyn JamStore>,
    clock: Arc<dyn Clock>,
}

impl JamRegistry {
    pub fn new(store: Arc<dyn JamStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persist a new jam. Fails with `InvalidWindowOrdering` before anything is stored
    /// when the windows are out of order.
    #[instrument(skip(self, jam), fields(community = %jam.community, topic = %jam.topic))]
    pub async fn create(&self, jam: NewJam) -> Result<Jam> {
        jam.validate()?;
        let created = self.store.insert_jam(&jam).await?;
        info!(
            "Created jam {} '{}' (active {} - {})",
            created.id,
            created.topic,
            created.windows.active().start().to_rfc3339(),
            created.windows.active().end().to_rfc3339()
        );
        Ok(created)
    }

    /// The jam whose voting window has not ended, earliest first. `None` is not an error.
    pub async fn next_or_current(&self, community: CommunityId) -> Result<Option<Jam>> {
        self.store
            .next_or_current_jam(community, self.clock.now())
            .await
    }

    /// Like [`Self::next_or_current`], failing with `NoActiveJam` when there is none
    pub async fn require_current(&self, community: CommunityId) -> Result<Jam> {
        self.next_or_current(community)
            .await?
            .ok_or(JamError::NoActiveJam)
    }

    pub async fn load(&self, id: JamId) -> Result<Jam> {
        self.store
            .load_jam(id)
            .await?
            .ok_or(JamError::JamNotFound(id))
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

/// The only mutator of a jam's voting flag
#[derive(Clone)]
pub struct VoteGate {
    store: Arc<dyn JamStore>,
}

impl VoteGate {
    pub fn new(store: Arc<dyn JamStore>) -> Self {
        Self { store }
    }

    /// Open or close voting. Returns whether the flag actually changed.
    #[instrument(skip(self))]
    pub async fn set_voting(&self, jam: JamId, open: bool) -> Result<bool> {
        let current = self
            .store
            .load_jam(jam)
            .await?
            .ok_or(JamError::JamNotFound(jam))?;

        if current.voting_open == open {
            debug!("Voting for jam {} already {}", jam, state_label(open));
            return Ok(false);
        }

        if !self.store.set_voting(jam, open).await? {
            return Err(JamError::JamNotFound(jam));
        }
        info!("Voting for jam {} is now {}", jam, state_label(open));
        Ok(true)
    }

    pub async fn is_voting(&self, jam: JamId) -> Result<bool> {
        Ok(self
            .store
            .load_jam(jam)
            .await?
            .ok_or(JamError::JamNotFound(jam))?
            .is_voting())
    }
}

fn state_label(open: bool) -> &'static str {
    if open {
        "open"
    } else {
        "closed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::{JamWindows, ManualClock, TimeWindow};
    use chrono::{Duration, TimeZone, Utc};

    fn draft(community: u64, start_day: u32) -> NewJam {
        let at = |day: u32| Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        NewJam {
            community: CommunityId(community),
            topic: "Gravity".to_string(),
            tagline: "Things fall".to_string(),
            timezone: "Europe/Berlin".to_string(),
            windows: JamWindows::new(
                TimeWindow::new(at(start_day - 2), at(start_day - 1)).unwrap(),
                TimeWindow::new(at(start_day), at(start_day + 2)).unwrap(),
                TimeWindow::new(at(start_day + 2), at(start_day + 4)).unwrap(),
            )
            .unwrap(),
        }
    }

    fn setup() -> (JamRegistry, VoteGate, Arc<ManualClock>) {
        let store: Arc<dyn JamStore> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        ));
        (
            JamRegistry::new(store.clone(), clock.clone()),
            VoteGate::new(store),
            clock,
        )
    }

    #[tokio::test]
    async fn next_or_current_moves_on_after_voting_ends() {
        let (registry, _, clock) = setup();
        let first = registry.create(draft(1, 10)).await.unwrap();
        let second = registry.create(draft(1, 20)).await.unwrap();

        assert_eq!(
            registry.next_or_current(CommunityId(1)).await.unwrap().unwrap().id,
            first.id
        );

        // first voting window ends on day 14 at noon
        clock.set(Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap());
        assert_eq!(
            registry.next_or_current(CommunityId(1)).await.unwrap().unwrap().id,
            second.id
        );

        clock.advance(Duration::days(30));
        assert!(registry.next_or_current(CommunityId(1)).await.unwrap().is_none());
        assert!(matches!(
            registry.require_current(CommunityId(1)).await,
            Err(JamError::NoActiveJam)
        ));
    }

    #[tokio::test]
    async fn unordered_windows_are_never_stored() {
        let (registry, _, _) = setup();
        let at = |day: u32| Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        let mut jam = draft(1, 10);
        // voting before the jam, registration after it
        jam.windows = JamWindows::unchecked(
            TimeWindow::new(at(20), at(22)).unwrap(),
            TimeWindow::new(at(10), at(11)).unwrap(),
            TimeWindow::new(at(5), at(6)).unwrap(),
        );

        assert!(matches!(
            registry.create(jam).await,
            Err(JamError::InvalidWindowOrdering(_))
        ));
        assert!(registry.next_or_current(CommunityId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_topic_is_rejected() {
        let (registry, _, _) = setup();
        let mut jam = draft(1, 10);
        jam.topic = "  ".to_string();
        assert!(matches!(
            registry.create(jam).await,
            Err(JamError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn voting_flag_flips_idempotently() {
        let (registry, votes, _) = setup();
        let jam = registry.create(draft(1, 10)).await.unwrap();

        assert!(!votes.is_voting(jam.id).await.unwrap());
        assert!(votes.set_voting(jam.id, true).await.unwrap());
        assert!(!votes.set_voting(jam.id, true).await.unwrap());
        assert!(votes.is_voting(jam.id).await.unwrap());

        // the stored window is untouched
        let stored = registry.load(jam.id).await.unwrap();
        assert_eq!(stored.windows, jam.windows);

        assert!(votes.set_voting(jam.id, false).await.unwrap());
        assert!(!votes.is_voting(jam.id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_jam_cannot_vote() {
        let (_, votes, _) = setup();
        assert!(matches!(
            votes.set_voting(JamId(42), true).await,
            Err(JamError::JamNotFound(_))
        ));
    }
}
