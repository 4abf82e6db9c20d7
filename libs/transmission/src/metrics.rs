//! Router counters and the stats snapshot built from them.

use crate::bus::BusStats;
use crate::router::RouterState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Router-wide counters
#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub signals_processed: AtomicU64,
    pub queries_relayed: AtomicU64,
    /// Queries answered `Missing` by the relay because no target or stub could take them
    pub queries_unresolved: AtomicU64,
}

impl RouterMetrics {
    pub(crate) fn record_signal(&self) {
        self.signals_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_relayed(&self) {
        self.queries_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unresolved(&self) {
        self.queries_unresolved.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of a router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterStats {
    pub state: RouterState,
    pub transformers: usize,
    pub signals_processed: u64,
    pub queries_relayed: u64,
    pub queries_unresolved: u64,
    pub handler_failures: u64,
    pub signal_bus: BusStats,
    pub data_bus: BusStats,
    pub effect_bus: BusStats,
    pub failure_bus: BusStats,
}

impl RouterStats {
    /// Items skipped by lagging subscribers across all buses
    pub fn total_lagged(&self) -> u64 {
        self.signal_bus.lagged
            + self.data_bus.lagged
            + self.effect_bus.lagged
            + self.failure_bus.lagged
    }
}
