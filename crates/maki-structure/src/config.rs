//! Export configuration (the subset of sushi-config.yaml the compiler reads)
//!
//! ```yaml
//! canonical: http://example.org/fhir/example-ig
//! fhirVersion: 4.0.1
//! version: 1.0.0
//! status: draft
//! publisher: Example Organization
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_FHIR_VERSION: &str = "4.0.1";

/// Project-level settings applied to every exported StructureDefinition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    /// Canonical base for all generated URLs
    pub canonical: String,

    /// FHIR version(s), single string or array in YAML
    #[serde(
        default = "default_fhir_version",
        deserialize_with = "deserialize_fhir_version"
    )]
    pub fhir_version: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Publication status written to each definition (draft when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    /// Copy an extension's title and description onto its root element
    #[serde(default = "default_true")]
    pub apply_extension_metadata_to_root: bool,
}

fn default_fhir_version() -> Vec<String> {
    vec![DEFAULT_FHIR_VERSION.to_string()]
}

fn default_true() -> bool {
    true
}

fn deserialize_fhir_version<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FhirVersionValue {
        Single(String),
        Multiple(Vec<String>),
    }

    match FhirVersionValue::deserialize(deserializer)? {
        FhirVersionValue::Single(s) => Ok(vec![s]),
        FhirVersionValue::Multiple(v) => {
            if v.is_empty() {
                Err(D::Error::custom("fhirVersion array cannot be empty"))
            } else {
                Ok(v)
            }
        }
    }
}

impl ExportConfig {
    pub fn new(canonical: impl Into<String>) -> Self {
        Self {
            canonical: canonical.into(),
            fhir_version: default_fhir_version(),
            version: None,
            status: None,
            publisher: None,
            apply_extension_metadata_to_root: true,
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<string>"), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Self = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.canonical.trim().is_empty() {
            errors.push("canonical is required".to_string());
        }
        for version in &self.fhir_version {
            if parse_fhir_version(version).is_none() {
                errors.push(format!("fhirVersion {version} is not a valid version"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors))
        }
    }

    /// The primary FHIR version (first listed)
    pub fn primary_fhir_version(&self) -> &str {
        self.fhir_version
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_FHIR_VERSION)
    }

    /// Major FHIR release number of the primary version (4 for R4, 5 for R5)
    pub fn fhir_major(&self) -> u64 {
        parse_fhir_version(self.primary_fhir_version())
            .map(|v| v.major)
            .unwrap_or(4)
    }

    pub fn status_or_default(&self) -> &str {
        self.status.as_deref().unwrap_or("draft")
    }

    /// Canonical base without trailing slash
    pub fn canonical_base(&self) -> &str {
        self.canonical.trim_end_matches('/')
    }
}

/// Parse a FHIR version like `4.0.1`, `5.0.0-ballot` or `4.3`
fn parse_fhir_version(version: &str) -> Option<semver::Version> {
    if let Ok(v) = semver::Version::parse(version) {
        return Some(v);
    }
    // Two-part versions are accepted as x.y.0
    let mut parts = version.splitn(2, '-');
    let core = parts.next()?;
    let pre = parts.next();
    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0"),
        1 => format!("{core}.0"),
        _ => return None,
    };
    let padded = match pre {
        Some(pre) => format!("{padded}-{pre}"),
        None => padded,
    };
    semver::Version::parse(&padded).ok()
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, std::io::Error),

    #[error("Parse error in {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("Validation errors: {0:?}")]
    ValidationError(Vec<String>),
}
