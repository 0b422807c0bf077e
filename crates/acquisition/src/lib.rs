//! Remote acquisition of forecast distributions.
//!
//! Two background loops keep local storage current:
//! - [`DownloadLoop`] finds the newest publication on the distribution server
//!   and mirrors all of its parts into `gribFiles/`.
//! - [`DecodeLoop`] waits for downloads to settle, then runs the external
//!   decoder over the newest raw distribution into `csvFiles/`, cropped around
//!   the current focus point.
//!
//! [`DirectFetcher`] serves single queries when nothing local covers them.

pub mod config;
pub mod decode;
pub mod download;
pub mod error;
pub mod fetcher;
pub mod focus;
pub mod retry;
pub mod source;
pub mod status;

pub use config::AcquisitionConfig;
pub use decode::{CommandDecoder, CropWindow, DecodeLoop, DecodeOutcome, PartDecoder};
pub use download::{CycleOutcome, DownloadLoop};
pub use error::{AcquisitionError, DecodeError, SourceError};
pub use fetcher::DirectFetcher;
pub use focus::{focus_channel, FocusPublisher, FocusReader};
pub use retry::{retry_until_ok, sleep_or_cancel};
pub use source::{DistributionSource, HttpDistributionSource};
pub use status::{AcquisitionStatus, DownloadPhase, StatusBoard};
