//! Common types and utilities shared across the wind field crates.

pub mod error;
pub mod geometry;
pub mod layout;
pub mod spot;
pub mod time;
pub mod wind;

pub use error::{WindError, WindResult};
pub use geometry::{is_inside, is_outside, surrounding_boundary, Boundary};
pub use layout::{prune_distributions, StorageLayout};
pub use spot::Spot;
pub use time::{bracket, floor_to_hours};
pub use wind::{AltitudeLevel, FocusPoint, WindComponent, WindVector, ALTITUDE_LEVELS};
