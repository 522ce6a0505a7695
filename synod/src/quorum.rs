//! Majority quorum rule.

/// Majority size for a cluster of `acceptors` nodes: `⌊N/2⌋ + 1`.
///
/// Any two sets of this size over the same `N` acceptors intersect in at
/// least one member, which is what lets a later prepare quorum learn about
/// any value a previous accept quorum may have chosen.
pub const fn majority(acceptors: usize) -> usize {
    acceptors / 2 + 1
}
