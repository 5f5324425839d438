use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Point-in-time copy of a registry's operation counters. All zero unless
/// the registry was built with profiling on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub stores: u64,
    pub grows: u64,
    pub fetch_hits: u64,
    pub fetch_misses: u64,
    pub deletes: u64,
    pub ignored_deletes: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    enabled: bool,
    pub(crate) stores: AtomicU64,
    pub(crate) grows: AtomicU64,
    pub(crate) fetch_hits: AtomicU64,
    pub(crate) fetch_misses: AtomicU64,
    pub(crate) deletes: AtomicU64,
    pub(crate) ignored_deletes: AtomicU64,
}

impl Counters {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    // Disabled counters are never written so lock-free readers share no
    // cache line by default.
    pub(crate) fn hit(&self, counter: &AtomicU64) {
        if self.enabled {
            counter.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            stores: self.stores.load(AtomicOrdering::Relaxed),
            grows: self.grows.load(AtomicOrdering::Relaxed),
            fetch_hits: self.fetch_hits.load(AtomicOrdering::Relaxed),
            fetch_misses: self.fetch_misses.load(AtomicOrdering::Relaxed),
            deletes: self.deletes.load(AtomicOrdering::Relaxed),
            ignored_deletes: self.ignored_deletes.load(AtomicOrdering::Relaxed),
        }
    }
}
