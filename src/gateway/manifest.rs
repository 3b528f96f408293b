//! Path manifest model and validation
//!
//! A path manifest is a JSON document mapping relative paths to transaction ids:
//!
//! ```json
//! {
//!   "manifest": "arweave/paths",
//!   "version": "0.2.0",
//!   "index": { "path": "index.html" },
//!   "fallback": { "id": "<txid>" },
//!   "paths": { "index.html": { "id": "<txid>" } }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Media type carried by manifest transactions
pub const MANIFEST_CONTENT_TYPE: &str = "application/x.arweave-manifest+json";

/// Required value of the `manifest` field
pub const MANIFEST_MARKER: &str = "arweave/paths";

/// The only supported manifest version
pub const MANIFEST_VERSION: &str = "0.2.0";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PathManifest {
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub index: Option<ManifestIndex>,
    #[serde(default)]
    pub fallback: Option<ManifestFallback>,
    #[serde(default)]
    pub paths: HashMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ManifestIndex {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ManifestFallback {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestEntry {
    pub id: String,
}

impl PathManifest {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The declared index path, if non-empty
    pub fn index_path(&self) -> Option<&str> {
        self.index
            .as_ref()
            .and_then(|index| index.path.as_deref())
            .filter(|path| !path.is_empty())
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback
            .as_ref()
            .and_then(|fallback| fallback.id.as_deref())
            .map_or(false, |id| !id.is_empty())
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    /// Checks the marker and version strings
    pub fn check_format(&self) -> Result<(), String> {
        if self.manifest.as_deref() != Some(MANIFEST_MARKER) {
            return Err(format!(
                "Invalid manifest type: {}",
                self.manifest.as_deref().unwrap_or("undefined")
            ));
        }

        if self.version.as_deref() != Some(MANIFEST_VERSION) {
            return Err(format!(
                "Unsupported manifest version: {}",
                self.version.as_deref().unwrap_or("undefined")
            ));
        }

        Ok(())
    }
}

/// Outcome of validating a manifest at resolution time
///
/// Persisted as JSON on the resolved target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestValidation {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_fallback: Option<bool>,
}

impl ManifestValidation {
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Validates a manifest body
    pub fn from_body(body: &str) -> Self {
        let manifest = match PathManifest::from_json(body) {
            Ok(manifest) => manifest,
            Err(e) => return Self::invalid(format!("Failed to parse manifest: {}", e)),
        };

        if let Err(message) = manifest.check_format() {
            return Self::invalid(message);
        }

        Self {
            is_valid: true,
            error: None,
            path_count: Some(manifest.paths.len()),
            has_index: Some(manifest.index_path().is_some()),
            has_fallback: Some(manifest.has_fallback()),
        }
    }

    /// A valid manifest that declares an index path
    pub fn is_crawlable(&self) -> bool {
        self.is_valid && self.has_index.unwrap_or(false)
    }
}
