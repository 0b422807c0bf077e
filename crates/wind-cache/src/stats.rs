//! Query counters shared between the dispatcher and status readers.
//!
//! The dispatcher is held exclusively for the whole of a query, remote
//! fallback included. Readers go through [`QueryStats`] instead and never
//! wait on it.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    #[default]
    Empty,
    Invalid,
    Valid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub refreshes: u64,
    pub failed_refreshes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounters {
    pub cache_hits: u64,
    pub local_refreshes: u64,
    pub remote_fallbacks: u64,
    pub failures: u64,
}

/// Point-in-time copy of everything [`QueryStats`] tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cache_validity: Validity,
    pub cache: CacheStats,
    pub tiers: TierCounters,
}

/// Cloneable handle to the live counters.
#[derive(Debug, Clone, Default)]
pub struct QueryStats {
    inner: Arc<RwLock<StatsSnapshot>>,
}

impl QueryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.read()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut StatsSnapshot)) {
        f(&mut self.write());
    }

    // Counters stay usable after a panic elsewhere
    fn read(&self) -> RwLockReadGuard<'_, StatsSnapshot> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Query stats lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StatsSnapshot> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Query stats lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let stats = QueryStats::new();
        let reader = stats.clone();
        assert_eq!(reader.snapshot(), StatsSnapshot::default());

        stats.update(|s| {
            s.cache_validity = Validity::Valid;
            s.cache.refreshes += 1;
            s.tiers.local_refreshes += 1;
        });

        let seen = reader.snapshot();
        assert_eq!(seen.cache_validity, Validity::Valid);
        assert_eq!(seen.cache.refreshes, 1);
        assert_eq!(seen.tiers.local_refreshes, 1);
    }
}
