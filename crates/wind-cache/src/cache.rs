//! Tri-state cache of two bracketing snapshots and their fitted model.
//!
//! ```text
//! Empty   --refresh ok-->   Valid
//! Valid   --spot outside--> Invalid
//! Invalid --refresh ok-->   Valid
//! ```
//!
//! A failed refresh leaves every field as it was. Building a bracket reads
//! tables and fits a model, so [`BracketLoader`] does it apart from the cache
//! and the result is installed afterwards.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use interpolation::{FittedModel, InterpolationStrategy};
use tracing::{debug, info, warn};
use wind_common::{
    is_inside, surrounding_boundary, Boundary, Spot, StorageLayout, WindComponent, WindError,
    WindResult, WindVector,
};

use crate::config::CacheConfig;
use crate::snapshot::Snapshot;
use crate::stats::{CacheStats, QueryStats, Validity};

/// Two bracketing snapshots and the model fitted on them.
#[derive(Debug)]
pub(crate) struct LoadedBracket {
    past: Arc<Snapshot>,
    future: Arc<Snapshot>,
    model: FittedModel,
    corners: Vec<Spot>,
    /// Horizontal extent of the training samples.
    window: Boundary,
}

/// Reads brackets from disk without touching the cache.
#[derive(Debug, Clone)]
pub(crate) struct BracketLoader {
    layout: StorageLayout,
    config: CacheConfig,
}

impl BracketLoader {
    /// Whether both bracket instants of `spot` are present in a decoded
    /// distribution on disk.
    pub(crate) fn has_local_bracket(&self, spot: &Spot) -> WindResult<bool> {
        let (before, after) = spot.time_bracket();
        for instant in [before, after] {
            match self.layout.find_parameters_dir(instant) {
                Ok(_) => {}
                Err(WindError::DataUnavailable(reason)) => {
                    debug!(instant = %instant, reason = %reason, "Bracket not on disk");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    pub(crate) fn load(&self, spot: &Spot) -> WindResult<LoadedBracket> {
        let (before, after) = spot.time_bracket();
        let past = Snapshot::load_for_instant(&self.layout, before)?;
        let future = Snapshot::load_for_instant(&self.layout, after)?;

        let window = surrounding_boundary(spot, self.config.lon_margin, self.config.lat_margin);
        if window.crosses_antimeridian() {
            warn!(
                lon_low = window.lon_low,
                lon_high = window.lon_high,
                "Training window crosses the antimeridian; longitudes are not wrapped"
            );
        }

        let model = fit_bracket(&past, &future, &window, &self.config.interpolation)?;
        let mut corners = past.eight_corners().to_vec();
        corners.extend(future.eight_corners());

        Ok(LoadedBracket {
            past: Arc::new(past),
            future: Arc::new(future),
            model,
            corners,
            window,
        })
    }
}

/// Cache answering queries inside the box of its two snapshots and the
/// window its model was trained on.
#[derive(Debug)]
pub struct WindCache {
    loader: BracketLoader,
    loaded: Option<LoadedBracket>,
    validity: Validity,
    stats: QueryStats,
}

impl WindCache {
    pub fn new(layout: StorageLayout, config: CacheConfig) -> Self {
        Self {
            loader: BracketLoader { layout, config },
            loaded: None,
            validity: Validity::Empty,
            stats: QueryStats::new(),
        }
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot().cache
    }

    /// Handle to the counters this cache updates.
    pub fn stats_handle(&self) -> QueryStats {
        self.stats.clone()
    }

    /// Dates of the cached `(past, future)` snapshots.
    pub fn bracket(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.loaded
            .as_ref()
            .map(|l| (l.past.date(), l.future.date()))
    }

    /// Whether `spot` can be answered from the current model.
    ///
    /// A valid cache queried outside the union of its snapshot boxes, or
    /// outside its training window, becomes invalid.
    pub fn is_answerable(&mut self, spot: &Spot) -> bool {
        let inside = match (&self.loaded, self.validity) {
            (Some(loaded), Validity::Valid) => {
                is_inside(spot, &loaded.corners)
                    && loaded.window.contains_position(spot.longitude, spot.latitude)
            }
            _ => {
                self.stats.update(|s| s.cache.misses += 1);
                return false;
            }
        };

        if inside {
            self.stats.update(|s| s.cache.hits += 1);
        } else {
            debug!(time = %spot.time, lon = spot.longitude, lat = spot.latitude, "Spot left cached box");
            self.stats.update(|s| {
                s.cache.misses += 1;
                s.cache.invalidations += 1;
            });
            self.set_validity(Validity::Invalid);
        }
        inside
    }

    /// Predict the wind at `spot`. Callers check [`Self::is_answerable`] first.
    pub fn answer(&self, spot: &Spot) -> WindResult<WindVector> {
        match (&self.loaded, self.validity) {
            (Some(loaded), Validity::Valid) => {
                predict_at(&loaded.model, loaded.past.date(), spot)
            }
            _ => Err(WindError::CacheNotReady(format!("{:?}", self.validity))),
        }
    }

    /// Mark the cache invalid without dropping its contents.
    pub fn invalidate(&mut self) {
        if self.validity == Validity::Valid {
            self.stats.update(|s| s.cache.invalidations += 1);
            self.set_validity(Validity::Invalid);
        }
    }

    /// Whether both bracket instants of `spot` are present in a decoded
    /// distribution on disk.
    pub fn has_local_bracket(&self, spot: &Spot) -> WindResult<bool> {
        self.loader.has_local_bracket(spot)
    }

    /// Rebuild the cache around `spot` from decoded data on disk, on the
    /// calling thread.
    pub fn refresh(&mut self, spot: &Spot) -> WindResult<()> {
        let built = self.loader.load(spot);
        self.install(built)
    }

    pub(crate) fn loader(&self) -> BracketLoader {
        self.loader.clone()
    }

    /// Swap in a bracket built by [`BracketLoader::load`], or record its failure.
    pub(crate) fn install(&mut self, built: WindResult<LoadedBracket>) -> WindResult<()> {
        match built {
            Ok(loaded) => {
                info!(
                    past = %loaded.past.date(),
                    future = %loaded.future.date(),
                    method = loaded.model.method(),
                    "Cache refreshed"
                );
                self.loaded = Some(loaded);
                self.stats.update(|s| s.cache.refreshes += 1);
                self.set_validity(Validity::Valid);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Cache refresh failed");
                self.stats.update(|s| s.cache.failed_refreshes += 1);
                Err(e)
            }
        }
    }

    fn set_validity(&mut self, validity: Validity) {
        self.validity = validity;
        self.stats.update(|s| s.cache_validity = validity);
    }
}

/// Fit `strategy` on the samples of both snapshots inside `window`.
///
/// Samples of `past` carry time offset 0, samples of `future` the bracket
/// length in seconds.
pub fn fit_bracket(
    past: &Snapshot,
    future: &Snapshot,
    window: &Boundary,
    strategy: &InterpolationStrategy,
) -> WindResult<FittedModel> {
    let span = seconds_between(past.date(), future.date());
    let samples = |component| {
        let mut samples = past.training_samples(0.0, component, window);
        samples.extend(future.training_samples(span, component, window));
        samples
    };
    strategy
        .fit(&samples(WindComponent::U), &samples(WindComponent::V))
        .map_err(|e| WindError::Interpolation(e.to_string()))
}

/// Evaluate `model` at `spot`, with time measured from `origin`.
pub fn predict_at(model: &FittedModel, origin: DateTime<Utc>, spot: &Spot) -> WindResult<WindVector> {
    let point = [
        spot.longitude,
        spot.latitude,
        spot.altitude,
        seconds_between(origin, spot.time),
    ];
    model
        .predict(point)
        .map_err(|e| WindError::Interpolation(e.to_string()))
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
