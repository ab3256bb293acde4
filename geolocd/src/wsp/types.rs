//! Geocoding request and result types.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::ErrorCode;
use crate::position::{Accuracy, Position};

/// Services a web-service provider may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WspFeature {
    Geocode,
    ReverseGeocode,
    Search,
    Timezone,
    Distance,
}

impl WspFeature {
    pub const ALL: [WspFeature; 5] = [
        WspFeature::Geocode,
        WspFeature::ReverseGeocode,
        WspFeature::Search,
        WspFeature::Timezone,
        WspFeature::Distance,
    ];

    fn bit(self) -> u8 {
        match self {
            Self::Geocode => 1 << 0,
            Self::ReverseGeocode => 1 << 1,
            Self::Search => 1 << 2,
            Self::Timezone => 1 << 3,
            Self::Distance => 1 << 4,
        }
    }
}

impl fmt::Display for WspFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Geocode => "geocode",
            Self::ReverseGeocode => "reverseGeocode",
            Self::Search => "search",
            Self::Timezone => "timezone",
            Self::Distance => "distance",
        };
        f.write_str(s)
    }
}

/// Set of [`WspFeature`]s a provider declares.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSet(u8);

impl FeatureSet {
    pub const EMPTY: Self = Self(0);

    pub fn insert(&mut self, feature: WspFeature) {
        self.0 |= feature.bit();
    }

    pub fn contains(self, feature: WspFeature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = WspFeature> {
        WspFeature::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl FromIterator<WspFeature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = WspFeature>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for feature in iter {
            set.insert(feature);
        }
        set
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Forward geocoding request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeocodeQuery {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl GeocodeQuery {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            language: None,
        }
    }
}

/// Postal address. Every component is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

/// Result of a geocode or reverse-geocode lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub address: Address,
    pub position: Option<Position>,
    pub accuracy: Accuracy,
}

/// One-shot delivery of a lookup result.
pub type GeocodeSink = oneshot::Sender<Result<GeocodeResult, ErrorCode>>;
pub type GeocodeReceiver = oneshot::Receiver<Result<GeocodeResult, ErrorCode>>;

pub fn geocode_channel() -> (GeocodeSink, GeocodeReceiver) {
    oneshot::channel()
}
