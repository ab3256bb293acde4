//! Configurable provider speaking the Nominatim search/reverse protocol.
//!
//! Any service exposing Nominatim-compatible `search` and `reverse`
//! endpoints can be configured by URL. The license key is sent as a `key`
//! parameter and the URL is signed like every other provider's.

use std::sync::Arc;

use reqwest::Url;
use serde::Deserialize;

use super::config::WspRecord;
use super::provider::{check_request, submit, WebServiceProvider};
use super::signing::sign_url;
use super::types::{
    Address, FeatureSet, GeocodeQuery, GeocodeResult, GeocodeSink, WspFeature,
};
use crate::error::ErrorCode;
use crate::http::{HttpRequest, HttpTransport};
use crate::position::{Accuracy, AccuracyLevel, Position};

pub struct GenericWsp {
    record: WspRecord,
    features: FeatureSet,
    transport: Arc<dyn HttpTransport>,
}

impl GenericWsp {
    pub fn new(record: WspRecord, transport: Arc<dyn HttpTransport>) -> Self {
        let features = record.feature_set();
        Self {
            record,
            features,
            transport,
        }
    }

    fn request(
        &self,
        feature: WspFeature,
        params: &[(&str, String)],
        language: Option<&str>,
    ) -> Result<HttpRequest, ErrorCode> {
        let base = self.record.url(feature).ok_or(ErrorCode::NotImplemented)?;
        let mut url = Url::parse_with_params(base, params).map_err(|e| {
            tracing::warn!(provider = %self.record.name, url = base, error = %e, "Invalid provider URL");
            ErrorCode::WrongParameter
        })?;
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("addressdetails", "1")
            .append_pair("key", &self.record.api_key);

        let request = HttpRequest::get(sign_url(&url, self.record.signing_secret())?);
        Ok(match language {
            Some(lang) => request.header("Accept-Language", lang),
            None => request,
        })
    }
}

impl WebServiceProvider for GenericWsp {
    fn name(&self) -> &str {
        &self.record.name
    }

    fn publish_features(&self) -> FeatureSet {
        self.features
    }

    fn geocode(&self, query: GeocodeQuery, sink: Option<GeocodeSink>) -> Result<(), ErrorCode> {
        let sink = check_request(sink, self.features, WspFeature::Geocode, &self.record.api_key)?;
        if query.address.trim().is_empty() {
            return Err(ErrorCode::WrongParameter);
        }

        let request = self.request(
            WspFeature::Geocode,
            &[("q", query.address.clone()), ("limit", "1".to_string())],
            query.language.as_deref(),
        )?;
        submit(
            self.transport.as_ref(),
            &self.record.name,
            request,
            sink,
            parse_response,
        )
    }

    fn reverse_geocode(
        &self,
        position: Position,
        sink: Option<GeocodeSink>,
    ) -> Result<(), ErrorCode> {
        let sink = check_request(
            sink,
            self.features,
            WspFeature::ReverseGeocode,
            &self.record.api_key,
        )?;

        let request = self.request(
            WspFeature::ReverseGeocode,
            &[
                ("lat", position.latitude().to_string()),
                ("lon", position.longitude().to_string()),
            ],
            None,
        )?;
        submit(
            self.transport.as_ref(),
            &self.record.name,
            request,
            sink,
            parse_response,
        )
    }
}

#[derive(Deserialize)]
struct Place {
    lat: String,
    lon: String,
    display_name: Option<String>,
    address: Option<PlaceAddress>,
}

#[derive(Deserialize, Default)]
struct PlaceAddress {
    house_number: Option<String>,
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

/// Parse a `search` (array) or `reverse` (object) response.
fn parse_response(body: &[u8]) -> Result<GeocodeResult, ErrorCode> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed geocode response");
        ErrorCode::NetworkError
    })?;

    let place = match value {
        serde_json::Value::Array(items) => items.into_iter().next().ok_or(ErrorCode::NotAvailable)?,
        serde_json::Value::Object(ref map) if map.contains_key("error") => {
            return Err(ErrorCode::NotAvailable)
        }
        other => other,
    };
    let place: Place = serde_json::from_value(place).map_err(|_| ErrorCode::NetworkError)?;

    let lat: f64 = place.lat.parse().map_err(|_| ErrorCode::NetworkError)?;
    let lon: f64 = place.lon.parse().map_err(|_| ErrorCode::NetworkError)?;
    let details = place.address.unwrap_or_default();

    let level = if details.house_number.is_some() {
        AccuracyLevel::Detailed
    } else if details.road.is_some() {
        AccuracyLevel::Street
    } else if details.postcode.is_some() {
        AccuracyLevel::PostalCode
    } else if details.city.is_some() || details.town.is_some() || details.village.is_some() {
        AccuracyLevel::Locality
    } else if details.state.is_some() {
        AccuracyLevel::Region
    } else if details.country.is_some() {
        AccuracyLevel::Country
    } else {
        AccuracyLevel::None
    };

    let street = match (&details.house_number, &details.road) {
        (Some(number), Some(road)) => Some(format!("{} {}", number, road)),
        (None, Some(road)) => Some(road.clone()),
        _ => None,
    };

    Ok(GeocodeResult {
        address: Address {
            freeform: place.display_name,
            street,
            locality: details.city.or(details.town).or(details.village),
            region: details.state,
            postal_code: details.postcode,
            country: details.country,
            country_code: details.country_code.map(|c| c.to_ascii_uppercase()),
        },
        position: Position::now(lat, lon),
        accuracy: Accuracy::new(level, 0.0, 0.0),
    })
}
