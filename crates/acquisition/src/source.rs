//! Forecast distribution server access.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use wind_common::time::ForecastPart;

use crate::config::AcquisitionConfig;
use crate::error::SourceError;

/// Where forecast parts come from.
#[async_trait]
pub trait DistributionSource: Send + Sync {
    /// Check whether `part` is published, without transferring it.
    async fn probe(&self, part: &ForecastPart) -> Result<(), SourceError>;

    /// Write `part` to `dest`, returning the number of bytes written.
    ///
    /// `dest` may hold a partial file when this returns an error.
    async fn fetch(&self, part: &ForecastPart, dest: &Path) -> Result<u64, SourceError>;
}

/// Distribution server reached over HTTP(S).
pub struct HttpDistributionSource {
    client: Client,
    base_url: String,
    file_prefix: String,
    extension: String,
    probe_timeout: Duration,
}

impl HttpDistributionSource {
    pub fn new(config: &AcquisitionConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| SourceError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            file_prefix: config.file_prefix.clone(),
            extension: config.extension.clone(),
            probe_timeout: config.probe_timeout(),
        })
    }

    /// `{base}/{YYYYMM}/{YYYYMMDD}/{prefix}_{YYYYMMDD_HH}00_{offset:03}.{ext}`
    pub fn part_url(&self, part: &ForecastPart) -> String {
        let p = part.publication;
        format!(
            "{}/{}/{}/{}_{}00_{:03}.{}",
            self.base_url,
            p.format("%Y%m"),
            p.format("%Y%m%d"),
            self.file_prefix,
            p.format("%Y%m%d_%H"),
            part.offset_hours,
            self.extension
        )
    }
}

#[async_trait]
impl DistributionSource for HttpDistributionSource {
    #[instrument(skip(self), fields(publication = %part.publication, offset = part.offset_hours))]
    async fn probe(&self, part: &ForecastPart) -> Result<(), SourceError> {
        let url = self.part_url(part);
        let response = self
            .client
            .head(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| match SourceError::from(e) {
                SourceError::Timeout(_) => SourceError::Timeout(self.probe_timeout),
                other => other,
            })?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(SourceError::NotFound(url)),
            s => Err(SourceError::HttpStatus {
                status: s.as_u16(),
                url,
            }),
        }
    }

    #[instrument(skip(self, dest), fields(publication = %part.publication, offset = part.offset_hours))]
    async fn fetch(&self, part: &ForecastPart, dest: &Path) -> Result<u64, SourceError> {
        let url = self.part_url(part);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(SourceError::NotFound(url)),
            s => {
                return Err(SourceError::HttpStatus {
                    status: s.as_u16(),
                    url,
                })
            }
        }

        let expected: Option<u64> = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(SourceError::Truncated {
                    expected,
                    actual: written,
                });
            }
        }

        debug!(bytes = written, url = %url, "Part fetched");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_part_url() {
        let config = AcquisitionConfig {
            base_url: "https://example.org/forecast/".to_string(),
            ..Default::default()
        };
        let source = HttpDistributionSource::new(&config).unwrap();
        let part = ForecastPart::new(Utc.with_ymd_and_hms(2024, 3, 7, 18, 0, 0).unwrap(), 9);
        assert_eq!(
            source.part_url(&part),
            "https://example.org/forecast/202403/20240307/gfs_4_20240307_1800_009.grb2"
        );
    }

    #[test]
    fn test_part_url_last_offset() {
        let source = HttpDistributionSource::new(&AcquisitionConfig::default()).unwrap();
        let part = ForecastPart::new(Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap(), 384);
        assert!(source
            .part_url(&part)
            .ends_with("/202312/20231231/gfs_4_20231231_0000_384.grb2"));
    }
}
