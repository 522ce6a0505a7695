//! Core types for the single-decree consensus protocol.
//!
//! This module defines the fundamental building blocks used throughout
//! the crate:
//!
//! - [`RoundNumber`]: globally unique, strictly increasing proposal number
//! - [`Value`]: the candidate payload a round tries to get chosen
//! - [`Proposal`]: an accepted `(round, value)` pair held by an acceptor
//! - [`PrepareReply`]: the explicit grant/deny contract of the prepare phase
//! - [`Decision`]: the terminal outcome of one proposer's loop
//! - [`SynodError`]: error type for cluster construction and worker failures

use serde::{Deserialize, Serialize};

/// Round number — a strictly increasing, globally unique proposal number.
///
/// Every proposal attempt draws a fresh round number from the shared
/// [`RoundAllocator`](crate::round::RoundAllocator). A higher round always
/// takes precedence over a lower one; safety of the whole protocol rests on
/// comparisons of these numbers inside each acceptor, never on message order.
///
/// # Invariants
///
/// - Round numbers are globally unique across every proposer in a run.
/// - Allocation is strictly monotonic, starting at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RoundNumber(pub u64);

impl RoundNumber {
    /// Create a new round number.
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// The raw counter value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RoundNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "round({})", self.0)
    }
}

/// A candidate value competing for the single decree.
///
/// The reference workload proposes the round number itself as the value, so
/// values share the round numbers' integer domain. A proposer only keeps its
/// own candidate when no acceptor discloses a previously accepted pair during
/// the prepare phase; otherwise the value of the highest-numbered accepted
/// proposal wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Value(pub u64);

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "value({})", self.0)
    }
}

/// An accepted `(round, value)` pair held by an acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// The round under which the value was accepted.
    pub round: RoundNumber,
    /// The accepted value.
    pub value: Value,
}

impl std::fmt::Display for Proposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.value, self.round)
    }
}

/// Identity of an acceptor within a cluster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AcceptorId(pub u32);

impl std::fmt::Display for AcceptorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "acceptor({})", self.0)
    }
}

/// Identity of a proposer worker within a cluster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProposerId(pub u32);

impl std::fmt::Display for ProposerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proposer({})", self.0)
    }
}

/// Reply to a prepare request.
///
/// The contract is explicit: the acceptor says whether the promise was
/// granted rather than leaving the caller to infer it from the returned
/// accepted pair. A promise is granted only when the incoming round is
/// strictly greater than every round the acceptor has promised so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareReply {
    /// The promise was granted: `min_round` was raised to the incoming round.
    ///
    /// Carries the pair that was accepted *before* this call, if any. The
    /// proposer must adopt the value of the highest such pair it sees among
    /// its promises.
    Promised {
        /// The pair this acceptor had accepted before this prepare call.
        accepted: Option<Proposal>,
    },

    /// The promise was denied: the acceptor has already promised an equal or
    /// higher round.
    ///
    /// The proposer treats this as preemption and abandons the round.
    Rejected {
        /// The acceptor's current promise floor.
        min_round: RoundNumber,
    },
}

/// Transient unavailability of an acceptor.
///
/// Raised when the bounded wait for the acceptor's lock times out or the
/// acceptor has been forced offline by fault injection. The call had no
/// effect on acceptor state and may be re-issued to the same acceptor later
/// in the same phase. This is never a proposal rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("acceptor unavailable: bounded lock wait timed out")]
pub struct Unavailable;

/// The terminal outcome of one proposer's loop.
///
/// Once produced, `value` is durably chosen: a quorum of acceptors hold it
/// under `round`, and every later round must rediscover and re-propose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// The proposer that drove the deciding round.
    pub proposer: ProposerId,
    /// The round under which the value reached a quorum.
    pub round: RoundNumber,
    /// The chosen value.
    pub value: Value,
}

/// Errors that can occur outside the normal protocol outcomes.
///
/// Protocol-level setbacks (unavailability, preemption, short quorums) are
/// not errors — the proposer loop absorbs them by retrying. These variants
/// cover cluster construction and the bounded-retry escape hatch.
#[derive(Debug, thiserror::Error)]
pub enum SynodError {
    /// The cluster configuration is unusable.
    #[error("invalid cluster config: {reason}")]
    InvalidConfig {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// A proposer hit its configured round budget without deciding.
    ///
    /// Only reachable when [`RetryPolicy::max_rounds`](crate::proposer::RetryPolicy)
    /// is set; the default policy retries forever, as mutual preemption among
    /// competing proposers can in principle loop indefinitely.
    #[error("{proposer} exhausted its round budget after {rounds} rounds")]
    RoundsExhausted {
        /// The proposer that gave up.
        proposer: ProposerId,
        /// The number of rounds it attempted.
        rounds: u64,
    },

    /// A proposer worker task failed to run to completion.
    #[error("proposer worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_numbers_order_by_value() {
        assert!(RoundNumber::new(2) > RoundNumber::new(1));
        assert_eq!(RoundNumber::new(7).get(), 7);
    }

    #[test]
    fn test_display_formats() {
        let pair = Proposal {
            round: RoundNumber::new(3),
            value: Value(9),
        };
        assert_eq!(pair.to_string(), "value(9)@round(3)");
        assert_eq!(AcceptorId(0).to_string(), "acceptor(0)");
        assert_eq!(ProposerId(1).to_string(), "proposer(1)");
    }
}
