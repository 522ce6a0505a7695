//! Cluster assembly, run driver, and post-run observation.
//!
//! A [`Cluster`] owns the shared pieces of a run: the acceptors and the
//! round allocator. [`Cluster::run`] spawns one tokio task per proposer,
//! waits for every worker to decide, then reads each acceptor's final state
//! and tallies accepted values — the operator-facing view of which value
//! won and by how many acceptors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::info;

use crate::acceptor::{Acceptor, AcceptorSnapshot};
use crate::network::JitterConfig;
use crate::proposer::{Proposer, RetryPolicy};
use crate::quorum::majority;
use crate::round::RoundAllocator;
use crate::types::{AcceptorId, Decision, ProposerId, SynodError, Value};

/// Configuration of a simulation run.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of acceptors (must be at least 1). Determines the quorum size.
    pub acceptors: usize,
    /// Number of competing proposer workers (must be at least 1).
    pub proposers: usize,
    /// Seed for every random stream in the run (shuffles and jitter).
    pub seed: u64,
    /// Transit latency applied before each prepare/accept call.
    pub jitter: JitterConfig,
    /// Bounded wait for each acceptor's lock; a timeout surfaces as
    /// transient unavailability.
    pub lock_timeout: Duration,
    /// Retry bounds for every proposer.
    pub retry: RetryPolicy,
}

impl Default for ClusterConfig {
    /// The reference topology: 5 acceptors, 2 proposers, 20–50ms transit
    /// latency, 20ms lock wait, retry forever.
    fn default() -> Self {
        Self {
            acceptors: 5,
            proposers: 2,
            seed: 0,
            jitter: JitterConfig::default(),
            lock_timeout: Duration::from_millis(20),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClusterConfig {
    /// A deterministic-test preset: no transit latency and a lock wait
    /// generous enough that unavailability only appears when injected.
    pub fn fast_local(acceptors: usize, proposers: usize, seed: u64) -> Self {
        Self {
            acceptors,
            proposers,
            seed,
            jitter: JitterConfig::fast_local(),
            lock_timeout: Duration::from_millis(200),
            retry: RetryPolicy::default(),
        }
    }

    fn validate(&self) -> Result<(), SynodError> {
        if self.acceptors == 0 {
            return Err(SynodError::InvalidConfig {
                reason: "at least one acceptor is required".into(),
            });
        }
        if self.proposers == 0 {
            return Err(SynodError::InvalidConfig {
                reason: "at least one proposer is required".into(),
            });
        }
        Ok(())
    }
}

/// A cluster of acceptors plus the shared round allocator.
///
/// Acceptors live for the whole run and are only mutated inside their own
/// prepare/accept critical sections; they can be inspected (or forced
/// offline) through [`Cluster::acceptors`] before and after a run.
#[derive(Debug)]
pub struct Cluster {
    config: ClusterConfig,
    allocator: RoundAllocator,
    acceptors: Vec<Arc<Acceptor>>,
}

impl Cluster {
    /// Build a cluster from a validated configuration.
    pub fn new(config: ClusterConfig) -> Result<Self, SynodError> {
        config.validate()?;
        let acceptors = (0..config.acceptors)
            .map(|i| Arc::new(Acceptor::new(AcceptorId(i as u32), config.lock_timeout)))
            .collect();
        Ok(Self {
            config,
            allocator: RoundAllocator::new(),
            acceptors,
        })
    }

    /// The cluster's acceptors, for fault injection and inspection.
    pub fn acceptors(&self) -> &[Arc<Acceptor>] {
        &self.acceptors
    }

    /// The quorum size for this cluster.
    pub fn quorum(&self) -> usize {
        majority(self.acceptors.len())
    }

    /// Run every proposer to its decision, then observe the acceptors.
    ///
    /// Intended to be called once per cluster; the acceptors keep their
    /// state across calls.
    pub async fn run(&self) -> Result<RunReport, SynodError> {
        info!(
            acceptors = self.config.acceptors,
            proposers = self.config.proposers,
            quorum = self.quorum(),
            seed = self.config.seed,
            "starting run"
        );

        let mut workers = JoinSet::new();
        for i in 0..self.config.proposers {
            let proposer = Proposer::new(
                ProposerId(i as u32),
                self.allocator.clone(),
                self.config.retry,
                self.config.jitter,
                proposer_seed(self.config.seed, i as u32),
            );
            let acceptors = self.acceptors.clone();
            workers.spawn(async move { proposer.run(&acceptors).await });
        }

        let mut decisions = Vec::with_capacity(self.config.proposers);
        while let Some(joined) = workers.join_next().await {
            let decision = joined.map_err(|e| SynodError::Worker(e.to_string()))??;
            decisions.push(decision);
        }
        decisions.sort_by_key(|d| d.proposer);

        let mut acceptors = Vec::with_capacity(self.acceptors.len());
        for acceptor in &self.acceptors {
            acceptors.push(acceptor.snapshot().await);
        }

        let tally = tally(&acceptors);
        Ok(RunReport {
            decisions,
            acceptors,
            tally,
        })
    }
}

/// Derive a per-proposer seed from the cluster seed.
fn proposer_seed(seed: u64, proposer: u32) -> u64 {
    seed.wrapping_add(u64::from(proposer + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

/// Count accepted values across the final acceptor states, most popular
/// first (ties broken by value for a stable order).
fn tally(acceptors: &[AcceptorSnapshot]) -> Vec<ValueCount> {
    let mut counts: HashMap<Value, usize> = HashMap::new();
    for snapshot in acceptors {
        if let Some(pair) = snapshot.accepted {
            *counts.entry(pair.value).or_default() += 1;
        }
    }
    let mut tally: Vec<ValueCount> = counts
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();
    tally.sort_by(|a, b| b.count.cmp(&a.count).then(a.value.cmp(&b.value)));
    tally
}

/// One entry of the post-run tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    /// An accepted value.
    pub value: Value,
    /// How many acceptors hold it.
    pub count: usize,
}

/// Everything observable after a run settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Each proposer's decision, ordered by proposer id.
    pub decisions: Vec<Decision>,
    /// Final state of every acceptor.
    pub acceptors: Vec<AcceptorSnapshot>,
    /// Accepted values by popularity.
    pub tally: Vec<ValueCount>,
}

impl RunReport {
    /// The value holding a majority of acceptors, if any does.
    pub fn winner(&self) -> Option<ValueCount> {
        let needed = majority(self.acceptors.len());
        self.tally.first().copied().filter(|vc| vc.count >= needed)
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for decision in &self.decisions {
            writeln!(
                f,
                "{} decided {} in {}",
                decision.proposer, decision.value, decision.round
            )?;
        }
        for snapshot in &self.acceptors {
            match snapshot.accepted {
                Some(pair) => writeln!(f, "{} holds {}", snapshot.id, pair)?,
                None => writeln!(f, "{} holds nothing", snapshot.id)?,
            }
        }
        for entry in &self.tally {
            writeln!(f, "{}: {} acceptor(s)", entry.value, entry.count)?;
        }
        Ok(())
    }
}
