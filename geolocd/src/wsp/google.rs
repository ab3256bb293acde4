//! Google Geocoding API provider.

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

/// Google geocoding provider.
pub struct GoogleWsp {
    record: WspRecord,
    features: FeatureSet,
    transport: Arc<dyn HttpTransport>,
}

impl GoogleWsp {
    pub fn new(record: WspRecord, transport: Arc<dyn HttpTransport>) -> Self {
        let features = record.feature_set();
        Self {
            record,
            features,
            transport,
        }
    }

    /// Build the signed request URL for `feature` with the given parameters.
    pub fn build_url(
        &self,
        feature: WspFeature,
        params: &[(&str, String)],
    ) -> Result<String, ErrorCode> {
        let base = self.record.url(feature).ok_or(ErrorCode::NotImplemented)?;
        let mut url = Url::parse_with_params(base, params).map_err(|e| {
            tracing::warn!(provider = %self.record.name, url = base, error = %e, "Invalid provider URL");
            ErrorCode::WrongParameter
        })?;
        url.query_pairs_mut().append_pair("key", &self.record.api_key);
        sign_url(&url, self.record.signing_secret())
    }

    fn params(language: Option<&str>, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(lang) = language {
            params.push(("language", lang.to_string()));
        }
        params
    }
}

impl WebServiceProvider for GoogleWsp {
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

        let params = Self::params(query.language.as_deref(), vec![("address", query.address)]);
        let url = self.build_url(WspFeature::Geocode, &params)?;
        tracing::debug!(provider = %self.record.name, "Submitting geocode request");
        submit(
            self.transport.as_ref(),
            &self.record.name,
            HttpRequest::get(url),
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

        let latlng = format!("{},{}", position.latitude(), position.longitude());
        let url = self.build_url(WspFeature::ReverseGeocode, &[("latlng", latlng)])?;
        tracing::debug!(provider = %self.record.name, "Submitting reverse geocode request");
        submit(
            self.transport.as_ref(),
            &self.record.name,
            HttpRequest::get(url),
            sink,
            parse_response,
        )
    }
}

#[derive(Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Deserialize)]
struct GoogleResult {
    formatted_address: Option<String>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
struct AddressComponent {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
    location_type: Option<String>,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

fn parse_response(body: &[u8]) -> Result<GeocodeResult, ErrorCode> {
    let response: GoogleResponse = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed Google geocode response");
        ErrorCode::NetworkError
    })?;

    match response.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Err(ErrorCode::NotAvailable),
        "REQUEST_DENIED" => return Err(ErrorCode::LicenseKeyInvalid),
        "INVALID_REQUEST" => return Err(ErrorCode::WrongParameter),
        other => {
            tracing::warn!(status = other, "Google geocode request failed");
            return Err(ErrorCode::NetworkError);
        }
    }

    let result = response
        .results
        .into_iter()
        .next()
        .ok_or(ErrorCode::NotAvailable)?;

    let component = |kind: &str| {
        result
            .address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == kind))
    };

    let street = match (component("route"), component("street_number")) {
        (Some(route), Some(number)) => Some(format!("{} {}", number.long_name, route.long_name)),
        (Some(route), None) => Some(route.long_name.clone()),
        _ => None,
    };

    let address = Address {
        freeform: result.formatted_address.clone(),
        street,
        locality: component("locality").map(|c| c.long_name.clone()),
        region: component("administrative_area_level_1").map(|c| c.long_name.clone()),
        postal_code: component("postal_code").map(|c| c.long_name.clone()),
        country: component("country").map(|c| c.long_name.clone()),
        country_code: component("country").map(|c| c.short_name.clone()),
    };

    let (position, level) = match &result.geometry {
        Some(geometry) => (
            Position::now(geometry.location.lat, geometry.location.lng),
            match geometry.location_type.as_deref() {
                Some("ROOFTOP") => AccuracyLevel::Detailed,
                Some("RANGE_INTERPOLATED") => AccuracyLevel::Street,
                Some("GEOMETRIC_CENTER") => AccuracyLevel::Locality,
                Some("APPROXIMATE") => AccuracyLevel::Region,
                _ => AccuracyLevel::None,
            },
        ),
        None => (None, AccuracyLevel::None),
    };

    Ok(GeocodeResult {
        address,
        position,
        accuracy: Accuracy::new(level, 0.0, 0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::MockAsyncHttpClient;
    use crate::http::{HttpError, HttpTransactionManager};
    use crate::wsp::geocode_channel;
    use std::collections::BTreeMap;

    const RESPONSE: &str = r#"{
        "status": "OK",
        "results": [{
            "formatted_address": "1600 Amphitheatre Pkwy, Mountain View, CA 94043, USA",
            "address_components": [
                {"long_name": "1600", "short_name": "1600", "types": ["street_number"]},
                {"long_name": "Amphitheatre Parkway", "short_name": "Amphitheatre Pkwy", "types": ["route"]},
                {"long_name": "Mountain View", "short_name": "Mountain View", "types": ["locality", "political"]},
                {"long_name": "California", "short_name": "CA", "types": ["administrative_area_level_1", "political"]},
                {"long_name": "United States", "short_name": "US", "types": ["country", "political"]},
                {"long_name": "94043", "short_name": "94043", "types": ["postal_code"]}
            ],
            "geometry": {
                "location": {"lat": 37.4224764, "lng": -122.0842499},
                "location_type": "ROOFTOP"
            }
        }]
    }"#;

    fn record(api_key: &str, features: &[WspFeature]) -> WspRecord {
        WspRecord {
            name: "google".to_string(),
            api_key: api_key.to_string(),
            signing_key: None,
            features: features
                .iter()
                .map(|f| (*f, "https://maps.example.com/geocode/json".to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn provider(
        api_key: &str,
        features: &[WspFeature],
        client: MockAsyncHttpClient,
    ) -> GoogleWsp {
        GoogleWsp::new(
            record(api_key, features),
            Arc::new(HttpTransactionManager::new(client)),
        )
    }

    #[test]
    fn test_parse_ok() {
        let result = parse_response(RESPONSE.as_bytes()).unwrap();
        assert_eq!(result.address.street.as_deref(), Some("1600 Amphitheatre Parkway"));
        assert_eq!(result.address.locality.as_deref(), Some("Mountain View"));
        assert_eq!(result.address.country_code.as_deref(), Some("US"));
        assert_eq!(result.accuracy.level, AccuracyLevel::Detailed);
        let position = result.position.unwrap();
        assert!((position.latitude() - 37.4224764).abs() < 1e-9);
    }

    #[test]
    fn test_parse_statuses() {
        let body = |status: &str| format!(r#"{{"status": "{}", "results": []}}"#, status);
        assert_eq!(parse_response(body("ZERO_RESULTS").as_bytes()), Err(ErrorCode::NotAvailable));
        assert_eq!(
            parse_response(body("REQUEST_DENIED").as_bytes()),
            Err(ErrorCode::LicenseKeyInvalid)
        );
        assert_eq!(
            parse_response(body("OVER_QUERY_LIMIT").as_bytes()),
            Err(ErrorCode::NetworkError)
        );
        assert_eq!(parse_response(b"<html>"), Err(ErrorCode::NetworkError));
    }

    #[test]
    fn test_build_url_is_signed() {
        let google = provider("key-1", &[WspFeature::Geocode], MockAsyncHttpClient::ok(vec![]));
        let url = google
            .build_url(WspFeature::Geocode, &[("address", "Main St & 1st".to_string())])
            .unwrap();
        assert!(url.starts_with("https://maps.example.com/geocode/json?address=Main+St+%26+1st&key=key-1"));
        assert!(url.contains("&signature="));
    }

    #[tokio::test]
    async fn test_geocode_delivers_result() {
        let client = MockAsyncHttpClient::ok(RESPONSE);
        let google = provider("key-1", &[WspFeature::Geocode], client.clone());
        let (tx, rx) = geocode_channel();

        google
            .geocode(GeocodeQuery::new("1600 Amphitheatre Pkwy"), Some(tx))
            .unwrap();

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.address.postal_code.as_deref(), Some("94043"));
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_feature_issues_no_request() {
        let client = MockAsyncHttpClient::ok(RESPONSE);
        let google = provider("key-1", &[WspFeature::ReverseGeocode], client.clone());
        let (tx, _rx) = geocode_channel();

        assert_eq!(
            google.geocode(GeocodeQuery::new("anywhere"), Some(tx)),
            Err(ErrorCode::NotImplemented)
        );
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_key_issues_no_request() {
        let client = MockAsyncHttpClient::ok(RESPONSE);
        let google = provider("", &[WspFeature::Geocode], client.clone());
        let (tx, _rx) = geocode_channel();

        assert_eq!(
            google.geocode(GeocodeQuery::new("anywhere"), Some(tx)),
            Err(ErrorCode::LicenseKeyInvalid)
        );
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_reverse_geocode_network_error() {
        let client = MockAsyncHttpClient::err(HttpError::Request("refused".into()));
        let google = provider("key-1", &[WspFeature::ReverseGeocode], client);
        let (tx, rx) = geocode_channel();

        let position = Position::new(0, 37.42, -122.08).unwrap();
        google.reverse_geocode(position, Some(tx)).unwrap();
        assert_eq!(rx.await.unwrap(), Err(ErrorCode::NetworkError));
    }

    #[test]
    fn test_missing_sink() {
        let google = provider("key-1", &[WspFeature::Geocode], MockAsyncHttpClient::ok(vec![]));
        assert_eq!(
            google.geocode(GeocodeQuery::new("x"), None),
            Err(ErrorCode::WrongParameter)
        );
    }
}
