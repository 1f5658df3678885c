//! Multi-chain coordination.
//!
//! Independent chains run as separate cooperating processes; the sampler
//! itself is coordination-agnostic. Drivers that aggregate chains inject
//! a [`ChainCoordinator`] for the designated-aggregator check and for a
//! barrier before collective file steps. The shared tag counter advances
//! monotonically so concurrent exchanges of auxiliary information cannot
//! cross-talk.

/// A barrier/tagging service over the cooperating chain processes.
pub trait ChainCoordinator {
    /// This process's rank, in `0..process_count()`.
    fn process_id(&self) -> usize;

    /// Number of cooperating chain processes.
    fn process_count(&self) -> usize;

    /// Blocks until every process has reached the barrier.
    fn barrier(&self);

    /// Returns a fresh communication tag, distinct from all earlier ones
    /// across the whole group. Implies a barrier.
    fn next_tag(&mut self) -> usize;

    /// Whether this process is the designated aggregator.
    fn is_master(&self) -> bool {
        self.process_id() == 0
    }
}

/// The trivial coordinator for a lone chain process.
#[derive(Debug, Clone)]
pub struct SingleProcess {
    tag: usize,
}

impl SingleProcess {
    /// A coordinator whose group is just this process.
    pub fn new() -> Self {
        Self { tag: 1000 }
    }
}

impl Default for SingleProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainCoordinator for SingleProcess {
    fn process_id(&self) -> usize {
        0
    }

    fn process_count(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn next_tag(&mut self) -> usize {
        self.tag += 10 * self.process_count();
        self.tag
    }
}
