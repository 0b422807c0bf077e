//! Synchronous single-query fetch straight from the distribution server.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, instrument, warn};
use wind_cache::{fit_bracket, predict_at, CacheConfig, RemoteFallback, Snapshot};
use wind_common::time::{dir_stamp, latest_plausible_publication, ForecastPart, PUBLICATION_CYCLE_HOURS};
use wind_common::{surrounding_boundary, FocusPoint, Spot, StorageLayout, WindError, WindResult, WindVector};

use crate::config::AcquisitionConfig;
use crate::decode::{CropWindow, PartDecoder};
use crate::error::SourceError;
use crate::source::DistributionSource;

/// Answers one query by downloading and decoding only the two parts around it.
///
/// Each part gets a single attempt bounded by the part timeout. Nothing is
/// written to the shared storage tree.
pub struct DirectFetcher {
    source: Arc<dyn DistributionSource>,
    decoder: Arc<dyn PartDecoder>,
    config: AcquisitionConfig,
    cache: CacheConfig,
}

impl DirectFetcher {
    pub fn new(
        source: Arc<dyn DistributionSource>,
        decoder: Arc<dyn PartDecoder>,
        config: AcquisitionConfig,
        cache: CacheConfig,
    ) -> Self {
        Self {
            source,
            decoder,
            config,
            cache,
        }
    }

    /// Newest publication at or before `past` (and `now`) offering both
    /// bracket instants, probing at most `remote_probe_depth` candidates.
    async fn find_publication(
        &self,
        past: DateTime<Utc>,
        future: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> WindResult<(ForecastPart, ForecastPart)> {
        let step = ChronoDuration::hours(i64::from(PUBLICATION_CYCLE_HOURS));
        let mut candidate = latest_plausible_publication(past.min(now));
        let mut last_error = None;

        for _ in 0..self.config.remote_probe_depth {
            if let Some(parts) = self.parts_for(candidate, past, future) {
                let probe = tokio::time::timeout(self.config.probe_timeout(), self.source.probe(&parts.0))
                    .await
                    .unwrap_or(Err(SourceError::Timeout(self.config.probe_timeout())));
                match probe {
                    Ok(()) => return Ok(parts),
                    Err(e) => {
                        debug!(publication = %candidate, error = %e, "Publication unavailable for direct fetch");
                        last_error = Some(e.to_string());
                    }
                }
            }
            candidate -= step;
        }

        Err(WindError::DataUnavailable(format!(
            "no publication within {} cycles covers {}..{}{}",
            self.config.remote_probe_depth,
            past,
            future,
            last_error.map(|e| format!(" (last error: {e})")).unwrap_or_default()
        )))
    }

    fn parts_for(
        &self,
        publication: DateTime<Utc>,
        past: DateTime<Utc>,
        future: DateTime<Utc>,
    ) -> Option<(ForecastPart, ForecastPart)> {
        let usable = |part: ForecastPart| {
            (part.offset_hours <= self.config.max_offset_hours
                && part.offset_hours % self.config.offset_step_hours.max(1) == 0)
                .then_some(part)
        };
        let first = ForecastPart::covering(publication, past).and_then(usable)?;
        let second = ForecastPart::covering(publication, future).and_then(usable)?;
        Some((first, second))
    }

    async fn fetch_and_decode(&self, part: &ForecastPart, workdir: &Path, crop: &CropWindow) -> WindResult<()> {
        let name = StorageLayout::part_file_name(part.valid_time(), &self.config.extension);
        let raw = workdir.join(&name);

        let timeout = self.config.part_timeout();
        tokio::time::timeout(timeout, self.source.fetch(part, &raw))
            .await
            .unwrap_or(Err(SourceError::Timeout(timeout)))
            .map_err(|e| WindError::DataUnavailable(format!("direct fetch of {name} failed: {e}")))?;

        let output_dir = workdir.join(dir_stamp(part.valid_time()));
        tokio::fs::create_dir_all(&output_dir).await.map_err(|e| {
            WindError::DataUnavailable(format!("cannot create {}: {e}", output_dir.display()))
        })?;
        self.decoder
            .decode(&raw, &output_dir, crop)
            .await
            .map_err(|e| WindError::DataUnavailable(format!("direct decode of {name} failed: {e}")))
    }
}

#[async_trait]
impl RemoteFallback for DirectFetcher {
    #[instrument(skip(self, spot), fields(time = %spot.time, lon = spot.longitude, lat = spot.latitude))]
    async fn fetch_point(&self, spot: &Spot) -> WindResult<WindVector> {
        let (past, future) = spot.time_bracket();
        let (first, second) = self.find_publication(past, future, Utc::now()).await?;
        info!(publication = %first.publication, offsets = ?(first.offset_hours, second.offset_hours), "Fetching bracket directly");

        let workdir = tempfile::tempdir()
            .map_err(|e| WindError::DataUnavailable(format!("cannot create direct fetch workdir: {e}")))?;
        let crop = CropWindow::around(&FocusPoint::from(spot), self.config.crop_margin);
        self.fetch_and_decode(&first, workdir.path(), &crop).await?;
        self.fetch_and_decode(&second, workdir.path(), &crop).await?;

        let dir = workdir.path().to_path_buf();
        let strategy = self.cache.interpolation.clone();
        let window = surrounding_boundary(spot, self.cache.lon_margin, self.cache.lat_margin);
        let spot = *spot;

        // table parsing and fitting are blocking work
        let result = tokio::task::spawn_blocking(move || {
            let past_snapshot = Snapshot::load_from_dir(&dir.join(dir_stamp(past)), past)?;
            let future_snapshot = Snapshot::load_from_dir(&dir.join(dir_stamp(future)), future)?;
            let model = fit_bracket(&past_snapshot, &future_snapshot, &window, &strategy)?;
            predict_at(&model, past, &spot)
        })
        .await
        .map_err(|e| WindError::DataUnavailable(format!("direct fit task failed: {e}")))?;

        if let Err(e) = &result {
            warn!(error = %e, "Direct fetch could not answer");
        }
        drop(workdir);
        result.map_err(|e| match e {
            WindError::Configuration(_) => e,
            other => WindError::DataUnavailable(other.to_string()),
        })
    }
}
