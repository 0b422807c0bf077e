//! Three-tier query dispatch: cache, local refresh, remote fallback.

use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use wind_common::{Spot, WindError, WindResult, WindVector};

use crate::cache::{LoadedBracket, WindCache};
use crate::remote::RemoteFallback;
use crate::stats::{CacheStats, QueryStats, TierCounters, Validity};

/// Which tier produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Cache,
    Local,
    Remote,
}

/// Owns the cache and routes each query to the cheapest tier able to answer.
///
/// Not shareable across tasks by itself; hosts serialise access. Counters
/// are readable at any time through [`Self::stats`].
pub struct Dispatcher {
    cache: WindCache,
    remote: Box<dyn RemoteFallback>,
    stats: QueryStats,
}

impl Dispatcher {
    pub fn new(cache: WindCache, remote: Box<dyn RemoteFallback>) -> Self {
        let stats = cache.stats_handle();
        Self {
            cache,
            remote,
            stats,
        }
    }

    /// Handle to the live cache and tier counters.
    pub fn stats(&self) -> QueryStats {
        self.stats.clone()
    }

    pub fn counters(&self) -> TierCounters {
        self.stats.snapshot().tiers
    }

    pub fn cache_validity(&self) -> Validity {
        self.cache.validity()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn answer(&mut self, spot: &Spot) -> WindResult<WindVector> {
        self.answer_with_tier(spot).await.map(|(wind, _)| wind)
    }

    /// Answer `spot` and report which tier did it.
    ///
    /// Configuration errors are returned immediately. Any other failure of
    /// the cache or local tiers moves on to the next tier.
    #[instrument(skip(self, spot), fields(time = %spot.time, lon = spot.longitude, lat = spot.latitude, alt = spot.altitude))]
    pub async fn answer_with_tier(&mut self, spot: &Spot) -> WindResult<(WindVector, Tier)> {
        if self.cache.is_answerable(spot) {
            match self.cache.answer(spot) {
                Ok(wind) => {
                    self.stats.update(|s| s.tiers.cache_hits += 1);
                    counter!("wind_cache_hits_total").increment(1);
                    return Ok((wind, Tier::Cache));
                }
                Err(e) if !e.is_recoverable() => return self.fail(e),
                Err(e) => {
                    // e.g. a missing grid node around the spot
                    debug!(error = %e, "Cached model cannot answer, rebuilding");
                    self.cache.invalidate();
                }
            }
        }

        match self.answer_locally(spot).await {
            Ok(Some(wind)) => {
                self.stats.update(|s| s.tiers.local_refreshes += 1);
                counter!("wind_local_refresh_total").increment(1);
                return Ok((wind, Tier::Local));
            }
            Ok(None) => {}
            Err(e) if !e.is_recoverable() => return self.fail(e),
            Err(e) => warn!(error = %e, "Local refresh failed, falling back to remote"),
        }

        info!("Querying remote distribution server");
        match self.remote.fetch_point(spot).await {
            Ok(wind) => {
                self.stats.update(|s| s.tiers.remote_fallbacks += 1);
                counter!("wind_remote_fallback_total").increment(1);
                Ok((wind, Tier::Remote))
            }
            Err(e) => self.fail(e),
        }
    }

    /// Rebuild the cache from local tables on the blocking pool, then answer.
    async fn answer_locally(&mut self, spot: &Spot) -> WindResult<Option<WindVector>> {
        let loader = self.cache.loader();
        let target = *spot;

        let built = tokio::task::spawn_blocking(move || -> WindResult<Option<WindResult<LoadedBracket>>> {
            if !loader.has_local_bracket(&target)? {
                return Ok(None);
            }
            Ok(Some(loader.load(&target)))
        })
        .await
        .map_err(|e| WindError::Interpolation(format!("cache refresh task failed: {e}")))??;

        let Some(built) = built else {
            return Ok(None);
        };
        self.cache.install(built)?;
        self.cache.answer(spot).map(Some)
    }

    fn fail<T>(&mut self, error: WindError) -> WindResult<T> {
        self.stats.update(|s| s.tiers.failures += 1);
        counter!("wind_query_failures_total").increment(1);
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use interpolation::InterpolationStrategy;
    use test_utils::{assert_approx_eq, assert_wind_approx_eq, linear_wind, region, TestStorage};

    use crate::CacheConfig;

    /// Remote fake returning a fixed vector and counting calls.
    struct CountingRemote {
        calls: Arc<AtomicUsize>,
        result: Option<WindVector>,
    }

    #[async_trait]
    impl RemoteFallback for CountingRemote {
        async fn fetch_point(&self, _spot: &Spot) -> WindResult<WindVector> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .ok_or_else(|| WindError::DataUnavailable("remote has nothing".into()))
        }
    }

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn dispatcher(storage: &TestStorage, result: Option<WindVector>) -> (Dispatcher, Arc<AtomicUsize>) {
        dispatcher_with(storage, CacheConfig::default(), result)
    }

    fn dispatcher_with(
        storage: &TestStorage,
        config: CacheConfig,
        result: Option<WindVector>,
    ) -> (Dispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = WindCache::new(storage.layout().clone(), config);
        let remote = CountingRemote {
            calls: calls.clone(),
            result,
        };
        (Dispatcher::new(cache, Box::new(remote)), calls)
    }

    fn storage_with_bracket() -> TestStorage {
        let storage = TestStorage::new();
        storage.write_snapshot(at(0), at(0), &region::ORIGIN_TEST, &linear_wind((1.0, 2.0)));
        storage.write_snapshot(at(0), at(3), &region::ORIGIN_TEST, &linear_wind((4.0, 5.0)));
        storage
    }

    #[tokio::test]
    async fn test_local_refresh_then_cache_hit() {
        let storage = storage_with_bracket();
        let (mut dispatcher, remote_calls) = dispatcher(&storage, None);
        let spot = Spot::new(at(1), 10.0, 20.0, 50.0);

        let (wind, tier) = dispatcher.answer_with_tier(&spot).await.unwrap();
        assert_eq!(tier, Tier::Local);
        assert_wind_approx_eq!(wind, (8.0, 7.5), 1e-9);
        assert_eq!(dispatcher.cache_stats().refreshes, 1);
        assert_eq!(remote_calls.load(Ordering::SeqCst), 0);

        // same query again is served without another refresh
        let (again, tier) = dispatcher.answer_with_tier(&spot).await.unwrap();
        assert_eq!(tier, Tier::Cache);
        assert_eq!(again, wind);
        assert_eq!(dispatcher.cache_stats().refreshes, 1);
        assert_eq!(remote_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            dispatcher.counters(),
            TierCounters {
                cache_hits: 1,
                local_refreshes: 1,
                remote_fallbacks: 0,
                failures: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_bracket_goes_remote() {
        let storage = storage_with_bracket();
        let (mut dispatcher, remote_calls) = dispatcher(&storage, Some(WindVector::new(1.5, -0.5)));

        let spot = Spot::new(at(4), 10.0, 20.0, 50.0);
        let (wind, tier) = dispatcher.answer_with_tier(&spot).await.unwrap();
        assert_eq!(tier, Tier::Remote);
        assert_eq!(wind, WindVector::new(1.5, -0.5));
        assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.cache_stats().refreshes, 0);
    }

    #[tokio::test]
    async fn test_remote_failure_is_data_unavailable() {
        let storage = TestStorage::new();
        let (mut dispatcher, remote_calls) = dispatcher(&storage, None);

        let result = dispatcher.answer(&Spot::new(at(1), 10.0, 20.0, 50.0)).await;
        assert!(matches!(result, Err(WindError::DataUnavailable(_))));
        assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.counters().failures, 1);
    }

    #[tokio::test]
    async fn test_configuration_error_skips_remote() {
        let storage = storage_with_bracket();
        std::fs::remove_dir_all(storage.layout().decoded_root()).unwrap();
        let (mut dispatcher, remote_calls) = dispatcher(&storage, Some(WindVector::new(0.0, 0.0)));

        let result = dispatcher.answer(&Spot::new(at(1), 10.0, 20.0, 50.0)).await;
        assert!(matches!(result, Err(WindError::Configuration(_))));
        assert_eq!(remote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_point_outside_training_window_rebuilds() {
        let storage = storage_with_bracket();
        let (mut dispatcher, remote_calls) = dispatcher(&storage, None);

        dispatcher.answer(&Spot::new(at(1), 10.0, 20.0, 50.0)).await.unwrap();
        // still inside the snapshot box (4..16) but outside the ±5° window
        let (wind, tier) = dispatcher
            .answer_with_tier(&Spot::new(at(1), 15.5, 20.0, 50.0))
            .await
            .unwrap();
        assert_eq!(tier, Tier::Local);
        // past u = 1 + 7.75 + 1 and future u is 3 higher
        assert_wind_approx_eq!(wind, (10.75, 7.5), 1e-9);
        assert_eq!(dispatcher.cache_stats().refreshes, 2);
        assert_eq!(remote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_kernel_model_is_not_used_outside_training_window() {
        let storage = storage_with_bracket();
        let config = CacheConfig {
            interpolation: InterpolationStrategy::GaussianProcess {
                length_scale: 0.3,
                signal_variance: 1.0,
                noise_variance: 1e-4,
                max_samples: 2000,
            },
            ..CacheConfig::default()
        };
        let (mut dispatcher, remote_calls) = dispatcher_with(&storage, config, None);

        dispatcher.answer(&Spot::new(at(0), 10.0, 20.0, 50.0)).await.unwrap();
        // corner of the snapshot box, 6° from the first window's centre
        let (wind, tier) = dispatcher
            .answer_with_tier(&Spot::new(at(0), 4.0, 14.0, 50.0))
            .await
            .unwrap();
        assert_eq!(tier, Tier::Local);
        assert_eq!(dispatcher.cache_stats().refreshes, 2);
        assert_eq!(remote_calls.load(Ordering::SeqCst), 0);

        // a training node of the rebuilt model: u = 1 + 2 + 1, v = 2 + 3.5 - 0.5
        assert_approx_eq!(wind.u, 4.0, 0.2);
        assert_approx_eq!(wind.v, 5.0, 0.2);
    }

    #[tokio::test]
    async fn test_stats_handle_sees_counters_without_dispatcher() {
        let storage = storage_with_bracket();
        let (mut dispatcher, _) = dispatcher(&storage, None);
        let stats = dispatcher.stats();

        let spot = Spot::new(at(1), 10.0, 20.0, 50.0);
        dispatcher.answer(&spot).await.unwrap();
        dispatcher.answer(&spot).await.unwrap();

        let seen = stats.snapshot();
        assert_eq!(seen.cache_validity, Validity::Valid);
        assert_eq!(seen.cache.refreshes, 1);
        assert_eq!(seen.tiers.cache_hits, 1);
        assert_eq!(seen.tiers.local_refreshes, 1);
    }
}
