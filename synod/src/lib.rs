//! # Synod: Single-Decree Consensus Simulation
//!
//! This crate simulates the single-decree ("Synod") consensus protocol:
//! competing proposers drive a shared set of acceptors toward agreement on
//! exactly one value, under injected network latency and transient acceptor
//! unavailability.
//!
//! ## Protocol in one table
//!
//! | Phase | Message | Acceptor rule | Proposer rule |
//! |-------|---------|---------------|---------------|
//! | Prepare | `prepare(n)` | promise iff `n > min_round`, disclose prior accepted pair | abandon on any rejection; at ⌊N/2⌋+1 promises adopt the highest disclosed value |
//! | Accept | `accept(n, v)` | store `(n, v)` iff `n >= min_round`, return resulting floor | abandon when a floor exceeds `n`; decided at ⌊N/2⌋+1 acceptances |
//!
//! Safety comes entirely from round-number comparisons inside each acceptor:
//! any two quorums intersect, so a later prepare quorum always meets an
//! acceptor holding a previously chosen value and is forced to re-propose
//! it. Message ordering contributes nothing and is deliberately scrambled.
//!
//! ## Simulation model
//!
//! - One tokio task per proposer; acceptors are shared and lock-guarded.
//! - Every prepare/accept call first sleeps a seeded random transit delay.
//! - Acceptor locks are acquired with a bounded wait; a timeout models a
//!   transiently unreachable node and never mutates state.
//! - All randomness (visitation shuffles, latency) derives from one
//!   configurable seed, so any run can be replayed exactly.
//!
//! ## Known limitation
//!
//! Competing proposers can preempt each other indefinitely. The engine
//! retries forever by default, faithful to its reference behavior; bound it
//! with [`RetryPolicy::max_rounds`] when determinism matters.
//!
//! ## Crate organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Core types: `RoundNumber`, `Value`, `PrepareReply`, `Decision`, `SynodError` |
//! | [`quorum`] | The majority rule `⌊N/2⌋ + 1` |
//! | [`round`] | Injected, shared `RoundAllocator` |
//! | [`network`] | Seeded transit-latency injection |
//! | [`acceptor`] | Acceptor state machine under a bounded-wait lock |
//! | [`proposer`] | The round-driving proposer loop |
//! | [`cluster`] | Cluster assembly, run driver, post-run tally |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod acceptor;
pub mod cluster;
pub mod network;
pub mod proposer;
pub mod quorum;
pub mod round;
pub mod types;

// Re-export key types at crate root for convenience
pub use acceptor::{Acceptor, AcceptorSnapshot};
pub use cluster::{Cluster, ClusterConfig, RunReport, ValueCount};
pub use network::{JitterConfig, NetworkJitter};
pub use proposer::{Proposer, RetryPolicy};
pub use quorum::majority;
pub use round::RoundAllocator;
pub use types::{
    AcceptorId, Decision, PrepareReply, Proposal, ProposerId, RoundNumber, SynodError,
    Unavailable, Value,
};
