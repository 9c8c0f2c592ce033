//! Fire-and-forget queue for platform calls made after a commit.
//!
//! Effects run one at a time on a background task, in submission order. A failed or
//! timed-out effect is logged and counted; it never reaches the caller that queued it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, warn};

use crate::domain::{ChannelId, CommunityId, DirectMessage, Notice, RoleId, UserId};
use crate::error::{PlatformError, PlatformResult};
use crate::ports::Platform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    GrantRole {
        community: CommunityId,
        user: UserId,
        role: RoleId,
    },
    RevokeRole {
        community: CommunityId,
        user: UserId,
        role: RoleId,
    },
    DirectMessage(DirectMessage),
    ChannelMessage {
        channel: ChannelId,
        notice: Notice,
    },
}

impl SideEffect {
    pub fn label(&self) -> &'static str {
        match self {
            SideEffect::GrantRole { .. } => "grant_role",
            SideEffect::RevokeRole { .. } => "revoke_role",
            SideEffect::DirectMessage(_) => "direct_message",
            SideEffect::ChannelMessage { .. } => "channel_message",
        }
    }

    async fn run(&self, platform: &dyn Platform) -> PlatformResult<()> {
        match self {
            SideEffect::GrantRole {
                community,
                user,
                role,
            } => platform.grant_role(*community, *user, *role).await,
            SideEffect::RevokeRole {
                community,
                user,
                role,
            } => platform.revoke_role(*community, *user, *role).await,
            SideEffect::DirectMessage(message) => platform.send_direct_message(message).await,
            SideEffect::ChannelMessage { channel, notice } => {
                platform.send_channel_message(*channel, notice).await
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideEffectStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

pub struct SideEffectQueue {
    tx: mpsc::UnboundedSender<SideEffect>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    counters: Arc<Counters>,
}

impl SideEffectQueue {
    /// Start the worker task. Must be called from within a tokio runtime.
    pub fn spawn(platform: Arc<dyn Platform>, timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SideEffect>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());
        let counters = Arc::new(Counters::default());

        let worker_in_flight = in_flight.clone();
        let worker_idle = idle.clone();
        let worker_counters = counters.clone();
        tokio::spawn(async move {
            while let Some(effect) = rx.recv().await {
                let outcome = match tokio::time::timeout(timeout, effect.run(platform.as_ref()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(PlatformError::Timeout {
                        elapsed_ms: timeout.as_millis() as u64,
                    }),
                };

                match &outcome {
                    Ok(()) => {
                        worker_counters.succeeded.fetch_add(1, Ordering::SeqCst);
                        debug!("Side effect {} completed", effect.label());
                    }
                    Err(e) => {
                        worker_counters.failed.fetch_add(1, Ordering::SeqCst);
                        error!("Side effect {} failed: {}", effect.label(), e);
                    }
                }

                if worker_in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                    worker_idle.notify_waiters();
                }
            }
            debug!("Side effect worker stopped");
        });

        Self {
            tx,
            in_flight,
            idle,
            counters,
        }
    }

    pub fn submit(&self, effect: SideEffect) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let label = effect.label();
        if self.tx.send(effect).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!("Side effect worker is gone, dropping {}", label);
            return;
        }
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once every submitted effect has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> SideEffectStats {
        SideEffectStats {
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockPlatform;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn runs_effects_and_drains() {
        let mut platform = MockPlatform::new();
        platform
            .expect_grant_role()
            .with(eq(CommunityId(1)), eq(UserId(2)), eq(RoleId(3)))
            .times(1)
            .returning(|_, _, _| Ok(()));
        platform
            .expect_send_channel_message()
            .times(1)
            .returning(|_, _| Ok(()));

        let queue = SideEffectQueue::spawn(Arc::new(platform), Duration::from_secs(1));
        queue.submit(SideEffect::GrantRole {
            community: CommunityId(1),
            user: UserId(2),
            role: RoleId(3),
        });
        queue.submit(SideEffect::ChannelMessage {
            channel: ChannelId(9),
            notice: Notice::joined_broadcast(UserId(2)),
        });
        queue.wait_idle().await;

        assert_eq!(queue.pending(), 0);
        let stats = queue.stats();
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn revoke_runs_against_the_platform() {
        let mut platform = MockPlatform::new();
        platform
            .expect_revoke_role()
            .with(eq(CommunityId(1)), eq(UserId(2)), eq(RoleId(3)))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let queue = SideEffectQueue::spawn(Arc::new(platform), Duration::from_secs(1));
        let effect = SideEffect::RevokeRole {
            community: CommunityId(1),
            user: UserId(2),
            role: RoleId(3),
        };
        assert_eq!(effect.label(), "revoke_role");
        queue.submit(effect);
        queue.wait_idle().await;

        assert_eq!(queue.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn failures_are_counted_not_propagated() {
        let mut platform = MockPlatform::new();
        platform
            .expect_send_direct_message()
            .times(1)
            .returning(|_| {
                Err(PlatformError::Status {
                    status: 403,
                    body: "Cannot send messages to this user".to_string(),
                })
            });

        let queue = SideEffectQueue::spawn(Arc::new(platform), Duration::from_secs(1));
        queue.submit(SideEffect::DirectMessage(DirectMessage {
            recipient: UserId(5),
            title: Notice::new("t"),
            body: Notice::new("b"),
            control: None,
        }));
        queue.wait_idle().await;

        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_empty() {
        let queue = SideEffectQueue::spawn(Arc::new(MockPlatform::new()), Duration::from_secs(1));
        queue.wait_idle().await;
        assert_eq!(queue.stats(), SideEffectStats::default());
    }
}
