//! Single-flight coordination of credential renewal
//!
//! At most one renewal is in flight at any time. Every caller that needs a
//! renewal while one is running awaits the same shared future and observes
//! the same outcome. The slot is emptied by the renewal itself when it
//! finishes, or by a logout/login that makes it obsolete.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::RenewalError;

/// New access token, or why there is none
pub type RenewalOutcome = std::result::Result<String, RenewalError>;

pub(crate) type SharedRenewal = Shared<BoxFuture<'static, RenewalOutcome>>;

/// What the caller decided once it holds the slot and found it empty
pub(crate) enum RenewalStart {
    /// No network round trip needed
    Immediate(RenewalOutcome),
    /// Launch this future as the renewal; it receives its id up front
    Launch(BoxFuture<'static, RenewalOutcome>),
}

pub(crate) enum RenewalTicket {
    Ready(RenewalOutcome),
    Joined(SharedRenewal),
    Started(SharedRenewal),
}

impl RenewalTicket {
    pub(crate) async fn outcome(self) -> RenewalOutcome {
        match self {
            RenewalTicket::Ready(outcome) => outcome,
            RenewalTicket::Joined(shared) => {
                debug!("Awaiting renewal already in flight");
                shared.await
            }
            RenewalTicket::Started(shared) => shared.await,
        }
    }
}

struct PendingRenewal {
    id: u64,
    future: SharedRenewal,
}

#[derive(Default)]
pub(crate) struct RenewalCoordinator {
    pending: Mutex<Option<PendingRenewal>>,
    next_id: AtomicU64,
    launched: AtomicU64,
}

impl RenewalCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight renewal, or let `decide` start one.
    ///
    /// `decide` runs while the slot lock is held, so the check it makes and
    /// the launch it returns cannot interleave with another caller's.
    pub(crate) fn join_or_start<F>(&self, decide: F) -> RenewalTicket
    where
        F: FnOnce(u64) -> RenewalStart,
    {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.as_ref() {
            return RenewalTicket::Joined(existing.future.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match decide(id) {
            RenewalStart::Immediate(outcome) => RenewalTicket::Ready(outcome),
            RenewalStart::Launch(future) => {
                let shared = future.shared();
                *pending = Some(PendingRenewal {
                    id,
                    future: shared.clone(),
                });
                self.launched.fetch_add(1, Ordering::Relaxed);
                debug!(renewal_id = id, "Started credential renewal");
                RenewalTicket::Started(shared)
            }
        }
    }

    /// Empty the slot if it still holds renewal `id`
    pub(crate) fn finish(&self, id: u64) {
        let mut pending = self.pending.lock();
        if pending.as_ref().map(|p| p.id) == Some(id) {
            *pending = None;
        }
    }

    /// Forget the in-flight renewal so later callers start fresh. Current
    /// waiters still receive its (discarded) outcome.
    pub(crate) fn cancel(&self) {
        if self.pending.lock().take().is_some() {
            debug!("Detached in-flight renewal");
        }
    }

    pub(crate) fn in_flight(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Number of renewals launched since creation
    pub(crate) fn launched(&self) -> u64 {
        self.launched.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_launch() {
        let coordinator = Arc::new(RenewalCoordinator::new());
        let gate = Arc::new(Notify::new());

        let mut tickets = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            let coordinator_ref = coordinator.clone();
            tickets.push(coordinator.join_or_start(move |id| {
                RenewalStart::Launch(
                    async move {
                        gate.notified().await;
                        coordinator_ref.finish(id);
                        Ok::<_, RenewalError>(format!("token-{}", id))
                    }
                    .boxed(),
                )
            }));
        }

        assert!(matches!(tickets[0], RenewalTicket::Started(_)));
        assert!(tickets[1..].iter().all(|t| matches!(t, RenewalTicket::Joined(_))));
        assert_eq!(coordinator.launched(), 1);

        gate.notify_one();
        let outcomes = futures::future::join_all(tickets.into_iter().map(|t| t.outcome())).await;
        assert!(outcomes.iter().all(|o| o.as_deref() == Ok("token-0")));
        assert!(!coordinator.in_flight());
    }

    #[tokio::test]
    async fn test_immediate_outcome_does_not_occupy_slot() {
        let coordinator = RenewalCoordinator::new();
        let ticket = coordinator
            .join_or_start(|_| RenewalStart::Immediate(Err(RenewalError::NoRefreshToken)));

        assert_eq!(ticket.outcome().await, Err(RenewalError::NoRefreshToken));
        assert!(!coordinator.in_flight());
        assert_eq!(coordinator.launched(), 0);
    }

    #[tokio::test]
    async fn test_cancel_lets_next_caller_start_fresh() {
        let coordinator = RenewalCoordinator::new();
        let first = coordinator.join_or_start(|_| {
            RenewalStart::Launch(futures::future::pending::<RenewalOutcome>().boxed())
        });
        assert!(matches!(first, RenewalTicket::Started(_)));

        coordinator.cancel();
        let second = coordinator.join_or_start(|_| {
            RenewalStart::Launch(async { Ok::<_, RenewalError>("fresh".to_string()) }.boxed())
        });
        assert!(matches!(second, RenewalTicket::Started(_)));
        assert_eq!(second.outcome().await.as_deref(), Ok("fresh"));
        assert_eq!(coordinator.launched(), 2);
    }

    #[test]
    fn test_finish_ignores_stale_id() {
        let coordinator = RenewalCoordinator::new();
        let _ticket = coordinator.join_or_start(|_| {
            RenewalStart::Launch(futures::future::pending::<RenewalOutcome>().boxed())
        });
        coordinator.finish(42);
        assert!(coordinator.in_flight());
        coordinator.finish(0);
        assert!(!coordinator.in_flight());
    }
}
