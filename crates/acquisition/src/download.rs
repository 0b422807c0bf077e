//! Download loop: discover the newest publication and mirror it locally.
//!
//! Parts are written into a `_staging` directory which is renamed to
//! `_distributed` only once every offset has been fetched.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use wind_common::time::{latest_plausible_publication, ForecastPart, PUBLICATION_CYCLE_HOURS};
use wind_common::{prune_distributions, StorageLayout};

use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, Result, SourceError};
use crate::retry::{retry_until_ok, sleep_or_cancel};
use crate::source::DistributionSource;
use crate::status::{DownloadPhase, StatusBoard};

/// Result of one download cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The discovered publication, or a newer one, is already committed locally.
    UpToDate(DateTime<Utc>),
    /// The publication was downloaded and committed.
    Downloaded(DateTime<Utc>),
    /// Cancelled before finishing; nothing was committed.
    Cancelled,
}

pub struct DownloadLoop {
    source: Arc<dyn DistributionSource>,
    layout: StorageLayout,
    config: AcquisitionConfig,
    phase: watch::Sender<DownloadPhase>,
    status: StatusBoard,
}

impl DownloadLoop {
    pub fn new(
        source: Arc<dyn DistributionSource>,
        layout: StorageLayout,
        config: AcquisitionConfig,
        status: StatusBoard,
    ) -> Self {
        let (phase, _) = watch::channel(DownloadPhase::Idle);
        Self {
            source,
            layout,
            config,
            phase,
            status,
        }
    }

    /// Receiver for the download phase, used by the decode loop as a gate.
    pub fn phase_receiver(&self) -> watch::Receiver<DownloadPhase> {
        self.phase.subscribe()
    }

    /// Run cycles until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            base_url = %self.config.base_url,
            parts = self.config.offsets().len(),
            "Starting download loop"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_cycle(Utc::now(), &cancel).await {
                Ok(CycleOutcome::UpToDate(publication)) => {
                    debug!(publication = %publication, "Local copy is current");
                }
                Ok(CycleOutcome::Downloaded(publication)) => {
                    info!(publication = %publication, "Distribution committed");
                }
                Ok(CycleOutcome::Cancelled) => break,
                Err(e) => {
                    error!(error = %e, "Download cycle failed");
                    self.status.record_error(&e).await;
                }
            }

            if !sleep_or_cancel(&cancel, self.config.idle_delay()).await {
                break;
            }
        }

        self.set_phase(DownloadPhase::Idle).await;
        info!("Download loop stopped");
    }

    /// One cycle: discover, compare with the newest local copy, download if newer.
    pub async fn run_cycle(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome> {
        let Some(publication) = self.discover_latest(now, cancel).await else {
            return Ok(CycleOutcome::Cancelled);
        };
        self.status
            .update(|s| s.latest_published = Some(publication))
            .await;

        // discovery may step back past a distribution already mirrored
        if self.layout.newest_raw()? >= Some(publication) {
            return Ok(CycleOutcome::UpToDate(publication));
        }

        let committed = self.download_distribution(publication, cancel).await;
        self.set_phase(DownloadPhase::Idle).await;

        match committed? {
            true => Ok(CycleOutcome::Downloaded(publication)),
            false => Ok(CycleOutcome::Cancelled),
        }
    }

    /// Find the newest publication whose first part is available, starting at
    /// the 6-hour mark at or before `now` and stepping back.
    ///
    /// Returns `None` only when cancelled.
    #[instrument(skip(self, cancel))]
    pub async fn discover_latest(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Option<DateTime<Utc>> {
        let step = ChronoDuration::hours(i64::from(PUBLICATION_CYCLE_HOURS));
        let mut candidate = latest_plausible_publication(now);

        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let part = ForecastPart::new(candidate, 0);
            let probe = tokio::select! {
                _ = cancel.cancelled() => return None,
                probe = tokio::time::timeout(self.config.probe_timeout(), self.source.probe(&part)) => probe,
            };
            let result = probe.unwrap_or(Err(SourceError::Timeout(self.config.probe_timeout())));

            match result {
                Ok(()) => {
                    info!(publication = %candidate, "Found latest publication");
                    return Some(candidate);
                }
                Err(e) if e.steps_back() => {
                    debug!(publication = %candidate, error = %e, "Publication not available, stepping back");
                    candidate -= step;
                }
                Err(e) => {
                    warn!(
                        publication = %candidate,
                        error = %e,
                        delay_secs = self.config.unexpected_error_delay_secs,
                        "Unexpected probe failure, probing again"
                    );
                    self.status.record_error(&e).await;
                    if !sleep_or_cancel(cancel, self.config.unexpected_error_delay()).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Fetch every part of `publication` and commit the distribution.
    ///
    /// Returns `Ok(false)` if cancelled; the staging directory is then left
    /// behind uncommitted and recreated by the next attempt.
    #[instrument(skip(self, cancel))]
    pub async fn download_distribution(
        &self,
        publication: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let staging = self.layout.raw_staging_dir(publication);
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging)
                .await
                .map_err(AcquisitionError::io(&staging))?;
        }
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(AcquisitionError::io(&staging))?;

        let offsets = self.config.offsets();
        self.set_phase(DownloadPhase::Downloading).await;
        self.status
            .update(|s| {
                s.parts_total = offsets.len();
                s.parts_completed = 0;
            })
            .await;

        info!(publication = %publication, parts = offsets.len(), "Downloading distribution");

        for (index, &offset) in offsets.iter().enumerate() {
            let part = ForecastPart::new(publication, offset);
            let dest = staging.join(StorageLayout::part_file_name(
                part.valid_time(),
                &self.config.extension,
            ));

            let fetched = retry_until_ok(cancel, self.config.retry_delay(), "part download", |attempt| {
                self.fetch_part(part, &dest, attempt)
            })
            .await;

            let Some(bytes) = fetched else {
                info!(publication = %publication, offset, "Download cancelled before commit");
                return Ok(false);
            };

            counter!("acquisition_parts_downloaded_total").increment(1);
            self.status.update(|s| s.parts_completed = index + 1).await;
            debug!(offset, bytes, "Part stored");
        }

        let target = self.layout.raw_distribution_dir(publication);
        if target.exists() {
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(AcquisitionError::io(&target))?;
        }
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(AcquisitionError::io(&target))?;

        self.status
            .update(|s| s.latest_downloaded = Some(publication))
            .await;
        info!(path = %target.display(), "Distribution downloaded");

        let pruned = prune_distributions(&self.layout.raw_root(), self.config.retain_distributions)?;
        if !pruned.is_empty() {
            info!(pruned = ?pruned, "Removed old raw distributions");
        }
        Ok(true)
    }

    /// One attempt at one part, bounded by the part timeout. A failed attempt
    /// never leaves a file behind.
    async fn fetch_part(
        &self,
        part: ForecastPart,
        dest: &Path,
        attempt: u32,
    ) -> std::result::Result<u64, SourceError> {
        if attempt > 0 {
            counter!("acquisition_part_retries_total").increment(1);
            self.status.update(|s| s.part_retries += 1).await;
        }

        let timeout = self.config.part_timeout();
        let result = match tokio::time::timeout(timeout, self.source.fetch(&part, dest)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(timeout)),
        };

        if let Err(e) = &result {
            if let Err(rm) = tokio::fs::remove_file(dest).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %dest.display(), error = %rm, "Failed to remove partial part");
                }
            }
            self.status.record_error(e).await;
        }
        result
    }

    async fn set_phase(&self, phase: DownloadPhase) {
        self.phase.send_replace(phase);
        self.status.update(|s| s.phase = phase).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use test_utils::TestStorage;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::hours(hour)
    }

    #[derive(Default)]
    struct FakeSource {
        available: HashSet<DateTime<Utc>>,
        probes: Mutex<Vec<DateTime<Utc>>>,
        transport_errors: Mutex<usize>,
        local_errors: Mutex<usize>,
        failures: Mutex<HashMap<u32, usize>>,
        hang_once: Mutex<HashSet<u32>>,
        fetched: Mutex<Vec<u32>>,
        cancel_at: Option<(u32, CancellationToken)>,
    }

    impl FakeSource {
        fn publishing(publications: &[DateTime<Utc>]) -> Self {
            Self {
                available: publications.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn probes(&self) -> Vec<DateTime<Utc>> {
            self.probes.lock().unwrap().clone()
        }

        fn fetched(&self) -> Vec<u32> {
            self.fetched.lock().unwrap().clone()
        }
    }

    fn take_one(remaining: &Mutex<usize>) -> bool {
        let mut remaining = remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }

    #[async_trait]
    impl DistributionSource for FakeSource {
        async fn probe(&self, part: &ForecastPart) -> std::result::Result<(), SourceError> {
            self.probes.lock().unwrap().push(part.publication);
            if take_one(&self.transport_errors) {
                return Err(SourceError::Transport("connection reset".into()));
            }
            if take_one(&self.local_errors) {
                return Err(SourceError::Io(std::io::Error::other("disk full")));
            }
            if self.available.contains(&part.publication) {
                Ok(())
            } else {
                Err(SourceError::NotFound(part.publication.to_string()))
            }
        }

        async fn fetch(&self, part: &ForecastPart, dest: &Path) -> std::result::Result<u64, SourceError> {
            let offset = part.offset_hours;
            self.fetched.lock().unwrap().push(offset);

            if let Some((cancel_offset, token)) = &self.cancel_at {
                if *cancel_offset == offset {
                    token.cancel();
                }
            }

            let hang = self.hang_once.lock().unwrap().remove(&offset);
            if hang {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }

            let fail = {
                let mut failures = self.failures.lock().unwrap();
                match failures.get_mut(&offset) {
                    Some(remaining) if *remaining > 0 => {
                        *remaining -= 1;
                        true
                    }
                    _ => false,
                }
            };

            if fail {
                tokio::fs::write(dest, b"half").await?;
                return Err(SourceError::Truncated {
                    expected: 8,
                    actual: 4,
                });
            }

            let body = format!("part {offset:03}");
            tokio::fs::write(dest, &body).await?;
            Ok(body.len() as u64)
        }
    }

    fn fast_config() -> AcquisitionConfig {
        AcquisitionConfig {
            retry_delay_secs: 0,
            idle_delay_secs: 0,
            unexpected_error_delay_secs: 0,
            ..Default::default()
        }
    }

    fn download_loop(storage: &TestStorage, source: Arc<FakeSource>, config: AcquisitionConfig) -> DownloadLoop {
        DownloadLoop::new(source, storage.layout().clone(), config, StatusBoard::new())
    }

    #[tokio::test]
    async fn test_probe_steps_back_six_hours() {
        let storage = TestStorage::new();
        let source = Arc::new(FakeSource::publishing(&[at(0)]));
        let downloader = download_loop(&storage, source.clone(), fast_config());

        let now = at(12) + ChronoDuration::minutes(30);
        let found = downloader.discover_latest(now, &CancellationToken::new()).await;

        assert_eq!(found, Some(at(0)));
        assert_eq!(source.probes(), vec![at(12), at(6), at(0)]);
    }

    #[tokio::test]
    async fn test_transport_error_steps_back() {
        let storage = TestStorage::new();
        let source = Arc::new(FakeSource {
            transport_errors: Mutex::new(1),
            ..FakeSource::publishing(&[at(0), at(6)])
        });
        let downloader = download_loop(&storage, source.clone(), fast_config());

        let found = downloader.discover_latest(at(7), &CancellationToken::new()).await;

        assert_eq!(found, Some(at(0)));
        assert_eq!(source.probes(), vec![at(6), at(0)]);
    }

    #[tokio::test]
    async fn test_local_error_retries_same_instant() {
        let storage = TestStorage::new();
        let source = Arc::new(FakeSource {
            local_errors: Mutex::new(2),
            ..FakeSource::publishing(&[at(6)])
        });
        let downloader = download_loop(&storage, source.clone(), fast_config());

        let found = downloader.discover_latest(at(7), &CancellationToken::new()).await;

        assert_eq!(found, Some(at(6)));
        assert_eq!(source.probes(), vec![at(6), at(6), at(6)]);
        assert!(downloader.status.snapshot().await.last_error.is_some());
    }

    #[tokio::test]
    async fn test_discover_cancelled() {
        let storage = TestStorage::new();
        let source = Arc::new(FakeSource::default());
        let downloader = download_loop(&storage, source, fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(downloader.discover_latest(at(0), &cancel).await, None);
    }

    #[tokio::test]
    async fn test_download_commits_all_parts() {
        let storage = TestStorage::new();
        let source = Arc::new(FakeSource::publishing(&[at(6)]));
        let downloader = download_loop(&storage, source.clone(), fast_config());
        let phase = downloader.phase_receiver();

        let outcome = downloader.run_cycle(at(8), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Downloaded(at(6)));

        let committed = storage.layout().raw_distribution_dir(at(6));
        assert_eq!(std::fs::read_dir(&committed).unwrap().count(), 129);
        assert!(committed.join("202401010600.grb2").is_file());
        assert!(committed.join("202401170600.grb2").is_file());
        assert!(!storage.layout().raw_staging_dir(at(6)).exists());
        assert_eq!(storage.layout().newest_raw().unwrap(), Some(at(6)));
        assert_eq!(*phase.borrow(), DownloadPhase::Idle);

        let status = downloader.status.snapshot().await;
        assert_eq!(status.parts_completed, 129);
        assert_eq!(status.latest_downloaded, Some(at(6)));
        assert_eq!(source.fetched(), (0..=384).step_by(3).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn test_commit_prunes_old_distributions() {
        let storage = TestStorage::new();
        storage.write_raw_distribution(at(0), [0, 3], "grb2");
        storage.write_raw_distribution(at(6), [0, 3], "grb2");
        let source = Arc::new(FakeSource::publishing(&[at(12)]));
        let config = AcquisitionConfig {
            max_offset_hours: 3,
            ..fast_config()
        };
        let downloader = download_loop(&storage, source, config);

        let outcome = downloader.run_cycle(at(13), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Downloaded(at(12)));
        assert_eq!(
            wind_common::layout::list_distributions(&storage.layout().raw_root()).unwrap(),
            vec![at(12), at(6)]
        );
    }

    #[tokio::test]
    async fn test_failed_part_retries_same_offset() {
        let storage = TestStorage::new();
        let source = Arc::new(FakeSource {
            failures: Mutex::new(HashMap::from([(6, 2)])),
            ..FakeSource::publishing(&[at(0)])
        });
        let downloader = download_loop(&storage, source.clone(), fast_config());

        assert!(downloader
            .download_distribution(at(0), &CancellationToken::new())
            .await
            .unwrap());

        let fetched = source.fetched();
        assert_eq!(&fetched[..5], &[0, 3, 6, 6, 6]);
        assert_eq!(fetched[5], 9);

        let part = storage
            .layout()
            .raw_distribution_dir(at(0))
            .join("202401010600.grb2");
        assert_eq!(std::fs::read_to_string(part).unwrap(), "part 006");
        assert_eq!(downloader.status.snapshot().await.part_retries, 2);
    }

    #[tokio::test]
    async fn test_hung_part_times_out_and_retries() {
        let storage = TestStorage::new();
        let source = Arc::new(FakeSource {
            hang_once: Mutex::new(HashSet::from([0])),
            ..FakeSource::publishing(&[at(0)])
        });
        let config = AcquisitionConfig {
            part_timeout_secs: 1,
            max_offset_hours: 3,
            ..fast_config()
        };
        let downloader = download_loop(&storage, source.clone(), config);

        assert!(downloader
            .download_distribution(at(0), &CancellationToken::new())
            .await
            .unwrap());
        assert_eq!(source.fetched(), vec![0, 0, 3]);
        assert_eq!(
            std::fs::read_dir(storage.layout().raw_distribution_dir(at(0)))
                .unwrap()
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_cancelled_download_is_never_committed() {
        let storage = TestStorage::new();
        let cancel = CancellationToken::new();
        let source = Arc::new(FakeSource {
            cancel_at: Some((30, cancel.clone())),
            failures: Mutex::new(HashMap::from([(30, 1)])),
            ..FakeSource::publishing(&[at(0)])
        });
        let downloader = download_loop(&storage, source, fast_config());

        let outcome = downloader.run_cycle(at(1), &cancel).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert!(!storage.layout().raw_distribution_dir(at(0)).exists());
        assert_eq!(storage.layout().newest_raw().unwrap(), None);
        assert_eq!(*downloader.phase_receiver().borrow(), DownloadPhase::Idle);
    }

    #[tokio::test]
    async fn test_existing_distribution_is_skipped() {
        let storage = TestStorage::new();
        storage.write_raw_distribution(at(6), (0..=384).step_by(3), "grb2");
        let source = Arc::new(FakeSource::publishing(&[at(6)]));
        let downloader = download_loop(&storage, source.clone(), fast_config());

        let outcome = downloader.run_cycle(at(9), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::UpToDate(at(6)));
        assert!(source.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_older_publication_than_local_is_skipped() {
        let storage = TestStorage::new();
        storage.write_raw_distribution(at(6), (0..=384).step_by(3), "grb2");
        // 06:00 no longer answers, so discovery settles on 00:00
        let source = Arc::new(FakeSource::publishing(&[at(0)]));
        let downloader = download_loop(&storage, source.clone(), fast_config());

        let outcome = downloader.run_cycle(at(7), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::UpToDate(at(0)));
        assert!(source.fetched().is_empty());
        assert!(!storage.layout().raw_distribution_dir(at(0)).exists());
    }

    #[tokio::test]
    async fn test_missing_storage_is_configuration_error() {
        let storage = TestStorage::new();
        std::fs::remove_dir_all(storage.layout().raw_root()).unwrap();
        let source = Arc::new(FakeSource::publishing(&[at(0)]));
        let downloader = download_loop(&storage, source, fast_config());

        let result = downloader.run_cycle(at(1), &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(AcquisitionError::Storage(wind_common::WindError::Configuration(_)))
        ));
    }
}
