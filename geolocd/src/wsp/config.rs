//! Provider configuration document.
//!
//! ```json
//! {
//!   "providers": [
//!     {
//!       "name": "google",
//!       "apiKey": "AIza...",
//!       "signingKey": "vNIXE0xscrmjlyV-12Nj_BvUPaw=",
//!       "features": {
//!         "geocode": "https://maps.googleapis.com/maps/api/geocode/json",
//!         "reverseGeocode": "https://maps.googleapis.com/maps/api/geocode/json"
//!       }
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{FeatureSet, WspFeature};

#[derive(Debug, Error)]
pub enum WspConfigError {
    #[error("Failed to read provider config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid provider config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Provider '{0}' is defined more than once")]
    DuplicateProvider(String),

    #[error("Provider entry {0} has an empty name")]
    MissingName(usize),
}

/// One provider: name, credentials and the URL of each supported feature.
///
/// A feature is supported exactly when it has a URL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WspRecord {
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    /// Secret used for URL signatures. Falls back to the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
    #[serde(default)]
    pub features: BTreeMap<WspFeature, String>,
}

impl WspRecord {
    pub fn feature_set(&self) -> FeatureSet {
        self.features.keys().copied().collect()
    }

    pub fn url(&self, feature: WspFeature) -> Option<&str> {
        self.features.get(&feature).map(String::as_str)
    }

    /// Secret for [`sign_url`](super::sign_url).
    pub fn signing_secret(&self) -> &str {
        self.signing_key.as_deref().unwrap_or(&self.api_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WspConfig {
    #[serde(default)]
    pub providers: Vec<WspRecord>,
}

impl WspConfig {
    pub fn load(path: &Path) -> Result<Self, WspConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| WspConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(json: &str) -> Result<Self, WspConfigError> {
        let config: WspConfig = serde_json::from_str(json)?;

        let mut seen = HashSet::new();
        for (i, record) in config.providers.iter().enumerate() {
            if record.name.trim().is_empty() {
                return Err(WspConfigError::MissingName(i));
            }
            if !seen.insert(record.name.as_str()) {
                return Err(WspConfigError::DuplicateProvider(record.name.clone()));
            }
        }
        Ok(config)
    }

    pub fn provider(&self, name: &str) -> Option<&WspRecord> {
        self.providers.iter().find(|p| p.name == name)
    }
}
