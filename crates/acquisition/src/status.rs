//! Acquisition progress shared with the status endpoint.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// What the download loop is doing. The decode loop only runs while `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPhase {
    Idle,
    Downloading,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionStatus {
    pub phase: DownloadPhase,
    pub latest_published: Option<DateTime<Utc>>,
    pub latest_downloaded: Option<DateTime<Utc>>,
    pub latest_decoded: Option<DateTime<Utc>>,
    pub parts_completed: usize,
    pub parts_total: usize,
    pub part_retries: u64,
    pub decode_failures: u64,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for AcquisitionStatus {
    fn default() -> Self {
        Self {
            phase: DownloadPhase::Idle,
            latest_published: None,
            latest_downloaded: None,
            latest_decoded: None,
            parts_completed: 0,
            parts_total: 0,
            part_retries: 0,
            decode_failures: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Cloneable handle to the shared status.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<AcquisitionStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> AcquisitionStatus {
        self.inner.read().await.clone()
    }

    /// Apply `f` under the write lock and stamp the update time.
    pub async fn update(&self, f: impl FnOnce(&mut AcquisitionStatus)) {
        let mut status = self.inner.write().await;
        f(&mut status);
        status.updated_at = Utc::now();
    }

    pub async fn record_error(&self, error: impl ToString) {
        let message = error.to_string();
        self.update(|s| s.last_error = Some(message)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_is_visible_to_clones() {
        let board = StatusBoard::new();
        let reader = board.clone();
        let before = reader.snapshot().await.updated_at;

        board
            .update(|s| {
                s.phase = DownloadPhase::Downloading;
                s.parts_total = 129;
                s.parts_completed = 4;
            })
            .await;
        board.record_error("HTTP 503").await;

        let status = reader.snapshot().await;
        assert_eq!(status.phase, DownloadPhase::Downloading);
        assert_eq!(status.parts_completed, 4);
        assert_eq!(status.last_error.as_deref(), Some("HTTP 503"));
        assert!(status.updated_at >= before);
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&DownloadPhase::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }
}
