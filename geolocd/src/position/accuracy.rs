//! Horizontal and vertical accuracy estimates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete accuracy class, ordered from least to most precise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyLevel {
    /// No accuracy information.
    #[default]
    None,
    Country,
    Region,
    Locality,
    PostalCode,
    Street,
    Detailed,
}

impl fmt::Display for AccuracyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Country => "country",
            Self::Region => "region",
            Self::Locality => "locality",
            Self::PostalCode => "postal_code",
            Self::Street => "street",
            Self::Detailed => "detailed",
        };
        f.write_str(s)
    }
}

/// Accuracy reported alongside every fix.
///
/// `horizontal` and `vertical` are error radii in meters. A `None` level with
/// both radii at zero means the fix succeeded but its accuracy is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Accuracy {
    pub level: AccuracyLevel,
    pub horizontal: f64,
    pub vertical: f64,
}

impl Accuracy {
    /// Fix succeeded, accuracy unknown.
    pub const UNKNOWN: Self = Self {
        level: AccuracyLevel::None,
        horizontal: 0.0,
        vertical: 0.0,
    };

    pub fn new(level: AccuracyLevel, horizontal: f64, vertical: f64) -> Self {
        Self {
            level,
            horizontal,
            vertical,
        }
    }

    /// Detailed accuracy with the given horizontal radius, as GNSS fixes report.
    pub fn detailed(horizontal: f64, vertical: f64) -> Self {
        Self::new(AccuracyLevel::Detailed, horizontal, vertical)
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.level == AccuracyLevel::None && self.horizontal == 0.0 && self.vertical == 0.0
    }
}
