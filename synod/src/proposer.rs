//! Proposer loop: the round-driving state machine.
//!
//! Each proposer runs the same four-state loop until its value (or a value
//! it was forced to adopt) is durably chosen:
//!
//! ```text
//! ALLOCATE_ROUND ──► PREPARE_PHASE ──► ACCEPT_PHASE ──► DECIDED
//!        ▲                │                  │
//!        └────────────────┴──────────────────┘
//!          preemption or insufficient quorum
//! ```
//!
//! ## Phase rules
//!
//! - Acceptors are visited in a fresh seeded shuffle per phase, which breaks
//!   systematic starvation of any fixed visiting order.
//! - [`Unavailable`](crate::types::Unavailable) replies requeue the acceptor and retry it later in the
//!   same phase, subject to the [`RetryPolicy`] requeue budget.
//! - A `Rejected` prepare reply abandons the round on the spot. This is
//!   stricter than classical Paxos, which would merely not count the reply;
//!   the eager restart under a fresh round is a deliberate property of this
//!   engine, kept as-is.
//! - Among granted promises, the value of the strictly highest-numbered
//!   previously accepted pair replaces the proposer's own candidate. This
//!   tie-break is the safety-critical rule: a later prepare quorum always
//!   intersects any earlier accept quorum, so a chosen value is always
//!   rediscovered and re-proposed.
//! - An accept reply whose floor exceeds the round means preemption and
//!   abandons the round.
//! - Once `f` acceptances land the value is chosen; the rest of the accept
//!   queue is drained best-effort so every reachable acceptor converges to
//!   the chosen pair.
//!
//! ## Liveness
//!
//! Two proposers can preempt each other indefinitely. The default policy
//! retries forever, faithful to the reference behavior; set
//! [`RetryPolicy::max_rounds`] to bound the loop in tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::acceptor::Acceptor;
use crate::network::{JitterConfig, NetworkJitter};
use crate::quorum::majority;
use crate::round::RoundAllocator;
use crate::types::{Decision, PrepareReply, ProposerId, RoundNumber, SynodError, Value};

/// Bounds on the proposer's retry behavior.
///
/// The defaults reproduce the reference engine: retry forever, requeue
/// unavailable acceptors without limit, no backoff between rounds. Tests
/// tighten these to stay deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Abandon the whole loop with [`SynodError::RoundsExhausted`] after
    /// this many rounds. `None` retries forever.
    pub max_rounds: Option<u64>,
    /// Per-phase budget of unavailable-acceptor requeues. Once spent, an
    /// unavailable acceptor is dropped from the phase instead of retried.
    /// `None` requeues without limit.
    pub requeue_budget: Option<u32>,
    /// Pause between an abandoned round and the next allocation.
    pub round_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rounds: None,
            requeue_budget: None,
            round_backoff: Duration::ZERO,
        }
    }
}

/// Why a phase ended without reaching its quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abandon {
    /// An acceptor reported a higher round; this round can never win.
    Preempted,
    /// The phase ran out of acceptors before collecting a quorum.
    ShortQuorum,
}

/// One proposer worker.
///
/// Owns its shuffle RNG and jitter stream; shares only the round allocator
/// and the acceptors with other workers.
#[derive(Debug)]
pub struct Proposer {
    id: ProposerId,
    allocator: RoundAllocator,
    retry: RetryPolicy,
    jitter: NetworkJitter,
    rng: ChaCha8Rng,
}

impl Proposer {
    /// Create a proposer worker.
    ///
    /// `seed` fixes both the visitation shuffle and the jitter stream, so a
    /// run is reproducible from the cluster seed alone.
    pub fn new(
        id: ProposerId,
        allocator: RoundAllocator,
        retry: RetryPolicy,
        jitter: JitterConfig,
        seed: u64,
    ) -> Self {
        // Decorrelate the shuffle stream from the latency stream.
        let jitter_seed = seed ^ 0x9e37_79b9_7f4a_7c15;
        Self {
            id,
            allocator,
            retry,
            jitter: NetworkJitter::new(jitter, jitter_seed),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Drive rounds until a value is durably chosen.
    ///
    /// Returns the decision, or [`SynodError::RoundsExhausted`] when a
    /// bounded [`RetryPolicy`] runs out of rounds.
    pub async fn run(mut self, acceptors: &[Arc<Acceptor>]) -> Result<Decision, SynodError> {
        let f = majority(acceptors.len());
        let mut rounds = 0u64;

        loop {
            if let Some(max) = self.retry.max_rounds {
                if rounds >= max {
                    return Err(SynodError::RoundsExhausted {
                        proposer: self.id,
                        rounds,
                    });
                }
            }
            rounds += 1;

            let round = self.allocator.allocate();
            info!(proposer = %self.id, round = %round, "prepare phase started");

            let value = match self.prepare_phase(acceptors, round, f).await {
                Ok(value) => value,
                Err(reason) => {
                    debug!(proposer = %self.id, round = %round, ?reason, "round abandoned");
                    self.backoff().await;
                    continue;
                }
            };

            info!(proposer = %self.id, round = %round, value = %value, "accept phase started");

            match self.accept_phase(acceptors, round, value, f).await {
                Ok(()) => {
                    info!(proposer = %self.id, round = %round, value = %value, "value chosen");
                    return Ok(Decision {
                        proposer: self.id,
                        round,
                        value,
                    });
                }
                Err(reason) => {
                    debug!(proposer = %self.id, round = %round, ?reason, "round abandoned");
                    self.backoff().await;
                }
            }
        }
    }

    /// Run the prepare phase for `round`; on success, return the value the
    /// accept phase must propose.
    async fn prepare_phase(
        &mut self,
        acceptors: &[Arc<Acceptor>],
        round: RoundNumber,
        f: usize,
    ) -> Result<Value, Abandon> {
        let mut queue = self.shuffled(acceptors);
        let mut requeues = 0u32;
        let mut promises = 0usize;
        // Until a promise discloses an accepted pair, propose our own
        // candidate: the round number itself.
        let mut candidate = Value(round.get());
        let mut highest_disclosed: Option<RoundNumber> = None;

        while let Some(acceptor) = queue.pop_front() {
            self.jitter.transit().await;
            match acceptor.prepare(round).await {
                Err(_) => {
                    if self.may_requeue(&mut requeues) {
                        // An offline reply returns without crossing an await
                        // point; yield so the retry loop cannot monopolize a
                        // current-thread runtime.
                        tokio::task::yield_now().await;
                        queue.push_back(acceptor);
                    }
                }
                Ok(PrepareReply::Rejected { min_round }) => {
                    debug!(
                        proposer = %self.id,
                        round = %round,
                        acceptor = %acceptor.id(),
                        min_round = %min_round,
                        "preempted during prepare"
                    );
                    return Err(Abandon::Preempted);
                }
                Ok(PrepareReply::Promised { accepted }) => {
                    if let Some(pair) = accepted {
                        if highest_disclosed.map_or(true, |h| pair.round > h) {
                            highest_disclosed = Some(pair.round);
                            candidate = pair.value;
                        }
                    }
                    promises += 1;
                    if promises >= f {
                        return Ok(candidate);
                    }
                }
            }
        }

        debug!(
            proposer = %self.id,
            round = %round,
            promises,
            needed = f,
            "insufficient prepare quorum"
        );
        Err(Abandon::ShortQuorum)
    }

    /// Run the accept phase for `(round, value)`.
    async fn accept_phase(
        &mut self,
        acceptors: &[Arc<Acceptor>],
        round: RoundNumber,
        value: Value,
        f: usize,
    ) -> Result<(), Abandon> {
        let mut queue = self.shuffled(acceptors);
        let mut requeues = 0u32;
        let mut accepts = 0usize;

        while let Some(acceptor) = queue.pop_front() {
            self.jitter.transit().await;
            match acceptor.accept(round, value).await {
                Err(_) => {
                    if self.may_requeue(&mut requeues) {
                        // Same yield as in the prepare phase: the requeue
                        // path must not starve the scheduler.
                        tokio::task::yield_now().await;
                        queue.push_back(acceptor);
                    }
                }
                Ok(min_round) if min_round > round => {
                    debug!(
                        proposer = %self.id,
                        round = %round,
                        acceptor = %acceptor.id(),
                        min_round = %min_round,
                        "preempted during accept"
                    );
                    return Err(Abandon::Preempted);
                }
                Ok(_) => {
                    accepts += 1;
                    if accepts >= f {
                        // The value is chosen once f acceptors hold it.
                        // Deliver it to the stragglers so every reachable
                        // acceptor converges to the chosen pair; unavailable
                        // ones are skipped, and a higher floor can no longer
                        // change the outcome.
                        while let Some(straggler) = queue.pop_front() {
                            self.jitter.transit().await;
                            let _ = straggler.accept(round, value).await;
                        }
                        return Ok(());
                    }
                }
            }
        }

        debug!(
            proposer = %self.id,
            round = %round,
            accepts,
            needed = f,
            "insufficient accept quorum"
        );
        Err(Abandon::ShortQuorum)
    }

    /// A fresh randomized visitation order over the acceptors.
    fn shuffled(&mut self, acceptors: &[Arc<Acceptor>]) -> VecDeque<Arc<Acceptor>> {
        let mut order: Vec<Arc<Acceptor>> = acceptors.to_vec();
        order.shuffle(&mut self.rng);
        VecDeque::from(order)
    }

    /// Spend one unit of the per-phase requeue budget, if any remains.
    fn may_requeue(&self, spent: &mut u32) -> bool {
        match self.retry.requeue_budget {
            None => true,
            Some(budget) if *spent < budget => {
                *spent += 1;
                true
            }
            Some(_) => false,
        }
    }

    async fn backoff(&self) {
        if !self.retry.round_backoff.is_zero() {
            tokio::time::sleep(self.retry.round_backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AcceptorId, Proposal};

    fn acceptors(n: u32) -> Vec<Arc<Acceptor>> {
        (0..n)
            .map(|i| Arc::new(Acceptor::new(AcceptorId(i), Duration::from_millis(20))))
            .collect()
    }

    fn proposer(allocator: RoundAllocator, retry: RetryPolicy, seed: u64) -> Proposer {
        Proposer::new(
            ProposerId(0),
            allocator,
            retry,
            JitterConfig::fast_local(),
            seed,
        )
    }

    #[tokio::test]
    async fn test_lone_proposer_decides_its_own_value_in_round_one() {
        let cluster = acceptors(3);
        let decision = proposer(RoundAllocator::new(), RetryPolicy::default(), 42)
            .run(&cluster)
            .await
            .expect("proposer failed");

        assert_eq!(decision.round, RoundNumber::new(1));
        assert_eq!(decision.value, Value(1));
    }

    #[tokio::test]
    async fn test_prepare_phase_adopts_highest_disclosed_value() {
        let cluster = acceptors(3);
        // Earlier rounds left accepted pairs behind; every prepare quorum
        // of 2 sees the round-2 pair, which must win the tie-break over the
        // round-1 pair.
        cluster[0].accept(RoundNumber::new(1), Value(11)).await.expect("call failed");
        cluster[1].accept(RoundNumber::new(2), Value(22)).await.expect("call failed");
        cluster[2].accept(RoundNumber::new(2), Value(22)).await.expect("call failed");

        let allocator = RoundAllocator::new();
        allocator.allocate();
        allocator.allocate();

        let decision = proposer(allocator, RetryPolicy::default(), 7)
            .run(&cluster)
            .await
            .expect("proposer failed");

        assert_eq!(decision.round, RoundNumber::new(3));
        assert_eq!(decision.value, Value(22));
    }

    #[tokio::test]
    async fn test_decided_value_reaches_every_available_acceptor() {
        let cluster = acceptors(5);
        // One dead acceptor: the accept phase must still deliver the chosen
        // pair to the other four, quorum member or not, and must not hang
        // retrying the dead one after the decision.
        cluster[2].set_online(false);

        let decision = proposer(RoundAllocator::new(), RetryPolicy::default(), 13)
            .run(&cluster)
            .await
            .expect("proposer failed");

        let chosen = Some(Proposal {
            round: decision.round,
            value: decision.value,
        });
        for acceptor in &cluster {
            let snap = acceptor.snapshot().await;
            if acceptor.is_online() {
                assert_eq!(snap.accepted, chosen, "{} diverged", snap.id);
            } else {
                assert_eq!(snap.accepted, None, "{} was offline", snap.id);
            }
        }
    }

    #[tokio::test]
    async fn test_unbounded_requeues_still_yield_to_the_scheduler() {
        // Fewer online acceptors than a quorum with an unlimited requeue
        // budget spins forever; the loop must keep yielding so timers on the
        // same (current-thread) runtime still fire.
        let cluster = acceptors(3);
        cluster[1].set_online(false);
        cluster[2].set_online(false);

        let spin = proposer(RoundAllocator::new(), RetryPolicy::default(), 17).run(&cluster);
        let guard = tokio::time::timeout(Duration::from_millis(100), spin).await;
        assert!(guard.is_err(), "the guard timer never fired");
    }

    #[tokio::test]
    async fn test_all_acceptors_offline_exhausts_a_bounded_loop() {
        let cluster = acceptors(3);
        for acceptor in &cluster {
            acceptor.set_online(false);
        }

        let retry = RetryPolicy {
            max_rounds: Some(2),
            requeue_budget: Some(1),
            round_backoff: Duration::ZERO,
        };
        let err = proposer(RoundAllocator::new(), retry, 3)
            .run(&cluster)
            .await
            .expect_err("loop should give up");

        match err {
            SynodError::RoundsExhausted { proposer, rounds } => {
                assert_eq!(proposer, ProposerId(0));
                assert_eq!(rounds, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stale_round_is_preempted_and_retried_under_a_fresh_one() {
        let cluster = acceptors(3);
        // Some other proposer already pushed every floor to round 5.
        for acceptor in &cluster {
            acceptor.prepare(RoundNumber::new(5)).await.expect("call failed");
        }

        // Our allocator starts below the floors, so the first rounds get
        // rejected during prepare until allocation passes 5.
        let decision = proposer(RoundAllocator::new(), RetryPolicy::default(), 99)
            .run(&cluster)
            .await
            .expect("proposer failed");

        assert!(decision.round > RoundNumber::new(5));
        assert_eq!(decision.value, Value(decision.round.get()));
    }
}
