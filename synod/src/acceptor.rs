//! Acceptor state machine.
//!
//! The acceptor is the voter of the protocol. It exposes exactly two
//! operations, both serialized under a bounded-wait exclusive lock:
//!
//! 1. **Prepare(n)**: grant a promise if `n` is strictly above the highest
//!    round promised so far, and disclose the previously accepted pair.
//! 2. **Accept(n, v)**: store `(n, v)` if `n` is at or above the promise
//!    floor, and report the resulting floor so the caller can detect
//!    preemption.
//!
//! ## Key invariants
//!
//! - `min_round` never decreases.
//! - After any successful accept, `accepted.round == min_round`.
//! - A timed-out call leaves state untouched; [`Unavailable`] is a transient
//!   condition, never a rejection.
//!
//! Bounding the lock wait is what simulates transient unavailability: under
//! contention a caller occasionally gives up instead of queueing, exactly
//! like a dropped request to a busy node. An acceptor can also be forced
//! offline wholesale through [`Acceptor::set_online`], which makes failure
//! injection deterministic in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::types::{AcceptorId, PrepareReply, Proposal, RoundNumber, Unavailable, Value};

/// The mutable core of an acceptor, guarded by the bounded-wait lock.
#[derive(Debug, Default)]
struct AcceptorCell {
    /// Monotonic lower bound on acceptable round numbers. `None` until the
    /// first promise is granted.
    min_round: Option<RoundNumber>,
    /// The currently accepted pair, if any.
    accepted: Option<Proposal>,
}

/// A single consensus acceptor.
///
/// Shared across every proposer worker; all mutation happens inside
/// [`prepare`](Self::prepare) and [`accept`](Self::accept) under the
/// acceptor's own lock. There is no cross-acceptor lock, so independent
/// acceptors serve requests fully in parallel.
#[derive(Debug)]
pub struct Acceptor {
    id: AcceptorId,
    lock_timeout: Duration,
    online: AtomicBool,
    cell: Mutex<AcceptorCell>,
}

impl Acceptor {
    /// Create an acceptor with the given bounded lock wait.
    pub fn new(id: AcceptorId, lock_timeout: Duration) -> Self {
        Self {
            id,
            lock_timeout,
            online: AtomicBool::new(true),
            cell: Mutex::new(AcceptorCell::default()),
        }
    }

    /// This acceptor's identity.
    pub fn id(&self) -> AcceptorId {
        self.id
    }

    /// Force the acceptor offline (every call returns [`Unavailable`]) or
    /// back online. Deterministic fault injection for tests and demos.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    /// Whether the acceptor currently serves calls at all.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Acquire the state lock within the bounded wait.
    async fn lock(&self) -> Result<MutexGuard<'_, AcceptorCell>, Unavailable> {
        if !self.is_online() {
            return Err(Unavailable);
        }
        tokio::time::timeout(self.lock_timeout, self.cell.lock())
            .await
            .map_err(|_| Unavailable)
    }

    /// Handle a prepare request for `round`.
    ///
    /// Grants the promise (raising `min_round` to `round`) only when `round`
    /// is strictly greater than the current floor. The reply always reflects
    /// the pair accepted *before* this call.
    pub async fn prepare(&self, round: RoundNumber) -> Result<PrepareReply, Unavailable> {
        let mut cell = self.lock().await?;
        match cell.min_round {
            Some(min) if round <= min => {
                debug!(
                    acceptor = %self.id,
                    round = %round,
                    min_round = %min,
                    "promise denied"
                );
                Ok(PrepareReply::Rejected { min_round: min })
            }
            _ => {
                cell.min_round = Some(round);
                debug!(
                    acceptor = %self.id,
                    round = %round,
                    prior = ?cell.accepted,
                    "promise granted"
                );
                Ok(PrepareReply::Promised {
                    accepted: cell.accepted,
                })
            }
        }
    }

    /// Handle an accept request for `(round, value)`.
    ///
    /// Stores the pair and raises the promise floor when `round` is at or
    /// above `min_round`. Always returns the resulting floor; a result above
    /// `round` tells the caller the proposal was preempted.
    pub async fn accept(
        &self,
        round: RoundNumber,
        value: Value,
    ) -> Result<RoundNumber, Unavailable> {
        let mut cell = self.lock().await?;
        match cell.min_round {
            Some(min) if round < min => {
                debug!(
                    acceptor = %self.id,
                    round = %round,
                    min_round = %min,
                    "accept preempted"
                );
                Ok(min)
            }
            _ => {
                cell.min_round = Some(round);
                cell.accepted = Some(Proposal { round, value });
                debug!(acceptor = %self.id, round = %round, value = %value, "accepted");
                Ok(round)
            }
        }
    }

    /// Read the acceptor's state for post-run observation.
    ///
    /// Waits for the lock without a bound; intended for after every proposer
    /// worker has finished, when the lock is uncontended.
    pub async fn snapshot(&self) -> AcceptorSnapshot {
        let cell = self.cell.lock().await;
        AcceptorSnapshot {
            id: self.id,
            min_round: cell.min_round,
            accepted: cell.accepted,
        }
    }
}

/// A point-in-time view of one acceptor's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptorSnapshot {
    /// The acceptor's identity.
    pub id: AcceptorId,
    /// The promise floor at snapshot time.
    pub min_round: Option<RoundNumber>,
    /// The accepted pair at snapshot time.
    pub accepted: Option<Proposal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acceptor() -> Acceptor {
        Acceptor::new(AcceptorId(0), Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_first_prepare_is_promised_with_no_prior_pair() {
        let acc = acceptor();
        let reply = acc.prepare(RoundNumber::new(1)).await.expect("call failed");
        assert_eq!(reply, PrepareReply::Promised { accepted: None });
    }

    #[tokio::test]
    async fn test_lower_or_equal_prepare_is_rejected() {
        let acc = acceptor();
        acc.prepare(RoundNumber::new(5)).await.expect("call failed");

        let reply = acc.prepare(RoundNumber::new(3)).await.expect("call failed");
        assert_eq!(
            reply,
            PrepareReply::Rejected {
                min_round: RoundNumber::new(5)
            }
        );
        let reply = acc.prepare(RoundNumber::new(5)).await.expect("call failed");
        assert_eq!(
            reply,
            PrepareReply::Rejected {
                min_round: RoundNumber::new(5)
            }
        );
    }

    #[tokio::test]
    async fn test_prepare_discloses_previously_accepted_pair() {
        let acc = acceptor();
        acc.prepare(RoundNumber::new(1)).await.expect("call failed");
        acc.accept(RoundNumber::new(1), Value(1)).await.expect("call failed");

        let reply = acc.prepare(RoundNumber::new(2)).await.expect("call failed");
        assert_eq!(
            reply,
            PrepareReply::Promised {
                accepted: Some(Proposal {
                    round: RoundNumber::new(1),
                    value: Value(1),
                })
            }
        );
    }

    #[tokio::test]
    async fn test_accept_at_or_above_floor_stores_pair() {
        let acc = acceptor();
        acc.prepare(RoundNumber::new(2)).await.expect("call failed");

        // Equal to the floor: stored.
        let min = acc.accept(RoundNumber::new(2), Value(9)).await.expect("call failed");
        assert_eq!(min, RoundNumber::new(2));

        // Above the floor without a prepare: stored, floor raised.
        let min = acc.accept(RoundNumber::new(4), Value(7)).await.expect("call failed");
        assert_eq!(min, RoundNumber::new(4));

        let snap = acc.snapshot().await;
        assert_eq!(snap.min_round, Some(RoundNumber::new(4)));
        assert_eq!(
            snap.accepted,
            Some(Proposal {
                round: RoundNumber::new(4),
                value: Value(7),
            })
        );
    }

    #[tokio::test]
    async fn test_preempted_accept_reports_floor_and_keeps_state() {
        let acc = acceptor();
        acc.prepare(RoundNumber::new(3)).await.expect("call failed");
        acc.accept(RoundNumber::new(3), Value(3)).await.expect("call failed");
        acc.prepare(RoundNumber::new(8)).await.expect("call failed");

        let min = acc.accept(RoundNumber::new(5), Value(5)).await.expect("call failed");
        assert_eq!(min, RoundNumber::new(8));

        let snap = acc.snapshot().await;
        assert_eq!(snap.min_round, Some(RoundNumber::new(8)));
        assert_eq!(
            snap.accepted,
            Some(Proposal {
                round: RoundNumber::new(3),
                value: Value(3),
            })
        );
    }

    #[tokio::test]
    async fn test_min_round_never_decreases() {
        let acc = acceptor();
        let rounds = [4u64, 2, 9, 1, 9, 12, 3];
        let mut floor = 0u64;
        for n in rounds {
            let _ = acc.prepare(RoundNumber::new(n)).await.expect("call failed");
            let snap = acc.snapshot().await;
            let now = snap.min_round.map_or(0, RoundNumber::get);
            assert!(now >= floor, "floor dropped from {floor} to {now}");
            floor = now;
        }
    }

    #[tokio::test]
    async fn test_accepted_round_equals_floor_after_successful_accept() {
        let acc = acceptor();
        acc.accept(RoundNumber::new(6), Value(6)).await.expect("call failed");
        let snap = acc.snapshot().await;
        assert_eq!(snap.accepted.map(|p| p.round), snap.min_round);
    }

    #[tokio::test]
    async fn test_offline_acceptor_is_unavailable() {
        let acc = acceptor();
        acc.set_online(false);
        assert_eq!(acc.prepare(RoundNumber::new(1)).await, Err(Unavailable));
        assert_eq!(
            acc.accept(RoundNumber::new(1), Value(1)).await,
            Err(Unavailable)
        );

        acc.set_online(true);
        assert!(acc.prepare(RoundNumber::new(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_contended_lock_times_out_without_mutation() {
        let acc = acceptor();
        let guard = acc.cell.lock().await;

        assert_eq!(acc.prepare(RoundNumber::new(1)).await, Err(Unavailable));
        assert_eq!(
            acc.accept(RoundNumber::new(1), Value(1)).await,
            Err(Unavailable)
        );

        drop(guard);
        let snap = acc.snapshot().await;
        assert_eq!(snap.min_round, None);
        assert_eq!(snap.accepted, None);
    }
}
