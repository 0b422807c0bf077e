//! Decode loop: turn the newest raw distribution into per-instant CSV tables.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use wind_common::{prune_distributions, FocusPoint, StorageLayout};

use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, DecodeError, Result};
use crate::focus::FocusReader;
use crate::retry::sleep_or_cancel;
use crate::status::{DownloadPhase, StatusBoard};

/// Geographic window kept when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropWindow {
    pub lat_low: f64,
    pub lat_high: f64,
    pub lon_low: f64,
    pub lon_high: f64,
}

impl CropWindow {
    /// `margin` degrees around `focus`, with latitudes clamped to the poles.
    pub fn around(focus: &FocusPoint, margin: f64) -> Self {
        Self {
            lat_low: (focus.latitude - margin).max(-90.0),
            lat_high: (focus.latitude + margin).min(90.0),
            lon_low: focus.longitude - margin,
            lon_high: focus.longitude + margin,
        }
    }
}

/// Turns one raw part file into a directory of level/component tables.
#[async_trait]
pub trait PartDecoder: Send + Sync {
    async fn decode(&self, input: &Path, output_dir: &Path, crop: &CropWindow) -> std::result::Result<(), DecodeError>;
}

/// Runs an external program as
/// `program input output_dir lat_low lat_high lon_low lon_high`.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: PathBuf,
}

impl CommandDecoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl PartDecoder for CommandDecoder {
    async fn decode(&self, input: &Path, output_dir: &Path, crop: &CropWindow) -> std::result::Result<(), DecodeError> {
        let output = tokio::process::Command::new(&self.program)
            .arg(input)
            .arg(output_dir)
            .arg(crop.lat_low.to_string())
            .arg(crop.lat_high.to_string())
            .arg(crop.lon_low.to_string())
            .arg(crop.lon_high.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DecodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DecodeError::Failed {
                input: input.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// Nothing downloaded yet.
    NoRawData,
    /// The newest raw distribution is already decoded.
    UpToDate(DateTime<Utc>),
    /// Decoded and committed.
    Decoded {
        publication: DateTime<Utc>,
        parts: usize,
        failures: usize,
    },
    /// Every part failed; nothing was committed.
    Failed(DateTime<Utc>),
    Cancelled,
}

pub struct DecodeLoop {
    decoder: Arc<dyn PartDecoder>,
    layout: StorageLayout,
    config: AcquisitionConfig,
    phase: watch::Receiver<DownloadPhase>,
    focus: FocusReader,
    status: StatusBoard,
}

impl DecodeLoop {
    pub fn new(
        decoder: Arc<dyn PartDecoder>,
        layout: StorageLayout,
        config: AcquisitionConfig,
        phase: watch::Receiver<DownloadPhase>,
        focus: FocusReader,
        status: StatusBoard,
    ) -> Self {
        Self {
            decoder,
            layout,
            config,
            phase,
            focus,
            status,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(decoder = %self.config.decoder_program.display(), "Starting decode loop");

        loop {
            if !self.wait_for_idle(&cancel).await {
                break;
            }

            match self.run_cycle(&cancel).await {
                Ok(DecodeOutcome::Decoded {
                    publication,
                    parts,
                    failures,
                }) => info!(publication = %publication, parts, failures, "Decoded distribution"),
                Ok(DecodeOutcome::Failed(publication)) => {
                    error!(publication = %publication, "No part could be decoded")
                }
                Ok(DecodeOutcome::Cancelled) => break,
                Ok(other) => debug!(outcome = ?other, "Nothing to decode"),
                Err(e) => {
                    error!(error = %e, "Decode cycle failed");
                    self.status.record_error(&e).await;
                }
            }

            if !sleep_or_cancel(&cancel, self.config.decode_idle_delay()).await {
                break;
            }
        }

        info!("Decode loop stopped");
    }

    /// Block until no download is in progress. Returns `false` if cancelled.
    pub async fn wait_for_idle(&mut self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            // a closed channel means no more downloads will start
            _ = self.phase.wait_for(|p| *p == DownloadPhase::Idle) => true,
        }
    }

    /// Decode the newest raw distribution if it is newer than the newest decoded one.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<DecodeOutcome> {
        let Some(raw) = self.layout.newest_raw()? else {
            return Ok(DecodeOutcome::NoRawData);
        };
        if self.layout.newest_decoded()? == Some(raw) {
            return Ok(DecodeOutcome::UpToDate(raw));
        }

        let crop = CropWindow::around(&self.focus.current(), self.config.crop_margin);
        self.decode_distribution(raw, &crop, cancel).await
    }

    /// Decode every part of the committed raw `publication` into a staging
    /// directory, then replace the decoded distribution with it.
    ///
    /// Parts the decoder rejects are logged and left out.
    #[instrument(skip(self, cancel))]
    pub async fn decode_distribution(
        &self,
        publication: DateTime<Utc>,
        crop: &CropWindow,
        cancel: &CancellationToken,
    ) -> Result<DecodeOutcome> {
        let raw_dir = self.layout.raw_distribution_dir(publication);
        let parts = list_parts(&raw_dir, &self.config.extension)?;

        let staging = self.layout.decoded_staging_dir(publication);
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging)
                .await
                .map_err(AcquisitionError::io(&staging))?;
        }
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(AcquisitionError::io(&staging))?;

        let mut failures = 0usize;
        for part in &parts {
            if cancel.is_cancelled() {
                return Ok(DecodeOutcome::Cancelled);
            }

            let Some(stem) = part.file_stem() else {
                continue;
            };
            let output_dir = staging.join(stem);
            tokio::fs::create_dir_all(&output_dir)
                .await
                .map_err(AcquisitionError::io(&output_dir))?;

            match self.decoder.decode(part, &output_dir, crop).await {
                Ok(()) => {
                    counter!("acquisition_parts_decoded_total").increment(1);
                    debug!(part = %part.display(), "Part decoded");
                }
                Err(e) => {
                    failures += 1;
                    warn!(part = %part.display(), error = %e, "Decoder failed, skipping part");
                    self.status
                        .update(|s| {
                            s.decode_failures += 1;
                            s.last_error = Some(e.to_string());
                        })
                        .await;
                    if let Err(rm) = tokio::fs::remove_dir_all(&output_dir).await {
                        warn!(path = %output_dir.display(), error = %rm, "Failed to remove output of failed part");
                    }
                }
            }
        }

        if !parts.is_empty() && failures == parts.len() {
            return Ok(DecodeOutcome::Failed(publication));
        }

        let target = self.layout.decoded_distribution_dir(publication);
        if target.exists() {
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(AcquisitionError::io(&target))?;
        }
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(AcquisitionError::io(&target))?;

        self.status
            .update(|s| s.latest_decoded = Some(publication))
            .await;

        let pruned = prune_distributions(&self.layout.decoded_root(), self.config.retain_distributions)?;
        if !pruned.is_empty() {
            info!(pruned = ?pruned, "Removed old decoded distributions");
        }

        Ok(DecodeOutcome::Decoded {
            publication,
            parts: parts.len(),
            failures,
        })
    }
}

/// Part files in `dir` with the given extension, sorted by name.
fn list_parts(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(AcquisitionError::io(dir))?;
    let mut parts = Vec::new();
    for entry in entries {
        let path = entry.map_err(AcquisitionError::io(dir))?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            parts.push(path);
        }
    }
    parts.sort();
    Ok(parts)
}
