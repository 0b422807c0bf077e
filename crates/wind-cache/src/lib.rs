//! Local side of the wind query path.
//!
//! - [`Snapshot`]: one decoded forecast instant read from disk
//! - [`WindCache`]: two bracketing snapshots plus a fitted model, with
//!   Empty / Invalid / Valid validity
//! - [`Dispatcher`]: answers queries from the cache, a local refresh, or a
//!   [`RemoteFallback`], in that order
//! - [`QueryStats`]: counters readable without holding the dispatcher

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod remote;
pub mod snapshot;
pub mod stats;

pub use cache::{fit_bracket, predict_at, WindCache};
pub use config::CacheConfig;
pub use dispatcher::{Dispatcher, Tier};
pub use remote::{NoRemote, RemoteFallback};
pub use snapshot::{Snapshot, TableRow};
pub use stats::{CacheStats, QueryStats, StatsSnapshot, TierCounters, Validity};
