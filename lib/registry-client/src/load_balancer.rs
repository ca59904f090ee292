//! Strategies for picking one instance address out of the live candidates

use rand::Rng;
use registry_core::SelectionPolicy;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Picks one address per call. Implementations must not assume the candidate
/// list is stable between calls; it is re-discovered every time.
pub trait SelectionStrategy: Send + Sync + Debug {
    fn select<'a>(&self, candidates: &'a [String]) -> Option<&'a String>;
}

/// Uniform random selection
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelection;

impl SelectionStrategy for RandomSelection {
    fn select<'a>(&self, candidates: &'a [String]) -> Option<&'a String> {
        if candidates.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..candidates.len());
        candidates.get(index)
    }
}

/// Round-robin over whatever candidates are presented
#[derive(Debug, Default)]
pub struct RoundRobinSelection {
    counter: AtomicUsize,
}

impl SelectionStrategy for RoundRobinSelection {
    fn select<'a>(&self, candidates: &'a [String]) -> Option<&'a String> {
        if candidates.is_empty() {
            return None;
        }
        let current = self.counter.fetch_add(1, Ordering::Relaxed);
        candidates.get(current % candidates.len())
    }
}

/// Build the strategy a configuration asks for
pub fn strategy_for(policy: SelectionPolicy) -> Arc<dyn SelectionStrategy> {
    match policy {
        SelectionPolicy::Random => Arc::new(RandomSelection),
        SelectionPolicy::RoundRobin => Arc::new(RoundRobinSelection::default()),
    }
}
