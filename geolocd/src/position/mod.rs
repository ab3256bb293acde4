//! Position, accuracy and satellite value types.
//!
//! This module defines the records every handler produces:
//!
//! - [`Position`] - A validated fix with a field-presence mask
//! - [`Accuracy`] - Discrete accuracy level plus numeric error bounds
//! - [`SatelliteData`] - Visible satellites with a derived used-in-fix count
//! - [`distance_m`] - Great-circle distance used by the criteria filter

mod accuracy;
mod fix;
mod geo;
mod satellite;

pub use accuracy::{Accuracy, AccuracyLevel};
pub use fix::{Position, PositionFields};
pub use geo::{distance_m, EARTH_RADIUS_M};
pub use satellite::{SatelliteData, SatelliteInfo};

use crate::error::ErrorCode;

/// Outcome of a single fix: a position with its accuracy, or the error the
/// source reported in its place.
pub type FixResult = Result<(Position, Accuracy), ErrorCode>;
