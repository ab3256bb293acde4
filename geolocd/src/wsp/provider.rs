//! Web-service provider trait and request validation.

use crate::error::ErrorCode;
use crate::http::{HttpRequest, HttpTransport};
use crate::position::Position;

use super::types::{FeatureSet, GeocodeQuery, GeocodeResult, GeocodeSink, WspFeature};

/// A geocoding backend reachable over HTTP.
///
/// Both lookups return synchronously once the request has been validated
/// and submitted; the result arrives later on the sink.
pub trait WebServiceProvider: Send + Sync {
    /// Registry key.
    fn name(&self) -> &str;

    /// Features this provider supports. Read once at registration.
    fn publish_features(&self) -> FeatureSet;

    fn geocode(&self, query: GeocodeQuery, sink: Option<GeocodeSink>) -> Result<(), ErrorCode>;

    fn reverse_geocode(&self, position: Position, sink: Option<GeocodeSink>)
        -> Result<(), ErrorCode>;
}

/// Validation shared by every provider, in order: a sink is present, the
/// feature is supported, a license key is configured.
pub(super) fn check_request(
    sink: Option<GeocodeSink>,
    features: FeatureSet,
    feature: WspFeature,
    api_key: &str,
) -> Result<GeocodeSink, ErrorCode> {
    let sink = sink.ok_or(ErrorCode::WrongParameter)?;
    if !features.contains(feature) {
        return Err(ErrorCode::NotImplemented);
    }
    if api_key.trim().is_empty() {
        return Err(ErrorCode::LicenseKeyInvalid);
    }
    Ok(sink)
}

/// Submit `request` and deliver the parsed body on `sink`.
pub(super) fn submit(
    transport: &dyn HttpTransport,
    origin: &str,
    request: HttpRequest,
    sink: GeocodeSink,
    parse: fn(&[u8]) -> Result<GeocodeResult, ErrorCode>,
) -> Result<(), ErrorCode> {
    transport.submit(
        origin,
        request,
        Box::new(move |result| {
            let outcome = result.and_then(|body| parse(&body));
            if sink.send(outcome).is_err() {
                tracing::trace!("Geocode requester went away before the reply");
            }
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsp::geocode_channel;

    fn features() -> FeatureSet {
        [WspFeature::Geocode].into_iter().collect()
    }

    #[test]
    fn test_missing_sink_checked_first() {
        assert_eq!(
            check_request(None, FeatureSet::EMPTY, WspFeature::Geocode, "").unwrap_err(),
            ErrorCode::WrongParameter
        );
    }

    #[test]
    fn test_feature_checked_before_key() {
        let (tx, _rx) = geocode_channel();
        assert_eq!(
            check_request(Some(tx), features(), WspFeature::ReverseGeocode, "").unwrap_err(),
            ErrorCode::NotImplemented
        );
    }

    #[test]
    fn test_empty_key() {
        let (tx, _rx) = geocode_channel();
        assert_eq!(
            check_request(Some(tx), features(), WspFeature::Geocode, "  ").unwrap_err(),
            ErrorCode::LicenseKeyInvalid
        );
    }

    #[test]
    fn test_accepted() {
        let (tx, _rx) = geocode_channel();
        assert!(check_request(Some(tx), features(), WspFeature::Geocode, "key").is_ok());
    }
}
