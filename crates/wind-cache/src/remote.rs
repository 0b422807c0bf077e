//! Last-resort query tier.

use async_trait::async_trait;
use wind_common::{Spot, WindError, WindResult, WindVector};

/// Answers a single query straight from the remote distribution server.
#[async_trait]
pub trait RemoteFallback: Send + Sync {
    async fn fetch_point(&self, spot: &Spot) -> WindResult<WindVector>;
}

/// Fallback for deployments without remote access: always unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

#[async_trait]
impl RemoteFallback for NoRemote {
    async fn fetch_point(&self, spot: &Spot) -> WindResult<WindVector> {
        Err(WindError::DataUnavailable(format!(
            "no local data for {} and remote fallback is disabled",
            spot.time
        )))
    }
}
