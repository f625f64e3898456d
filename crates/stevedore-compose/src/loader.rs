//! Manifest loading and schema version classification.
//!
//! Version 1 documents are a flat map of services; version 2 documents
//! wrap them in a top-level `services:` section next to `volumes:` and
//! `networks:`. The two shapes cannot be told apart by a single schema,
//! so the version is read first and the service section is shaped
//! accordingly.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use stevedore_common::error::{ComposeError, Result};

use crate::value::{RawServiceMap, Scalar, Value, into_raw_service};

/// Major schema version of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// Flat service map, no top-level sections.
    V1,
    /// Structured `services`/`volumes`/`networks` sections.
    V2,
    /// Declared but not supported.
    V3,
}

impl SchemaVersion {
    /// Classifies a major version number.
    ///
    /// Anything below 2 is treated as the legacy flat format; 3 and above
    /// fall on the unsupported side of the compatibility boundary.
    #[must_use]
    pub const fn classify(major: u32) -> Self {
        match major {
            0 | 1 => Self::V1,
            2 => Self::V2,
            _ => Self::V3,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "1"),
            Self::V2 => write!(f, "2"),
            Self::V3 => write!(f, "3"),
        }
    }
}

/// One parsed manifest document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    /// Version string as declared (empty for v1 documents).
    pub version: String,
    /// Raw service definitions.
    pub services: RawServiceMap,
    /// Raw top-level volume definitions.
    pub volumes: BTreeMap<String, Value>,
    /// Raw top-level network definitions.
    pub networks: BTreeMap<String, Value>,
}

impl Manifest {
    /// Returns the classified schema version of this manifest.
    ///
    /// # Errors
    ///
    /// Returns a format error if the version string is malformed.
    pub fn schema_version(&self) -> Result<SchemaVersion> {
        major_version(&self.version).map(SchemaVersion::classify)
    }
}

/// Extracts the major version from a declared version string.
///
/// `""` is version 1, `"2"` is 2, and `"2.1"` is 2.
///
/// # Errors
///
/// Returns a format error for any other shape.
pub fn major_version(version: &str) -> Result<u32> {
    if version.is_empty() {
        return Ok(1);
    }
    let parts: Vec<&str> = version.split('.').collect();
    let major = match parts.as_slice() {
        [major] | [major, _] => major.parse::<u32>().ok(),
        _ => None,
    };
    major.ok_or_else(|| ComposeError::Format {
        message: format!(
            "invalid version string, expected single integer or dot delimited int.int, got: {version}"
        ),
    })
}

/// Parses document bytes into a [`Manifest`].
///
/// Optional sections that are absent or null default to empty maps.
///
/// # Errors
///
/// Returns a format error if the document is not valid YAML, is not a
/// mapping, declares a malformed version, or contains a service whose body
/// is not a mapping.
pub fn create_config(bytes: &[u8]) -> Result<Manifest> {
    let document: serde_yaml::Value = serde_yaml::from_slice(bytes)?;
    let mut root = match Value::from_yaml(document)? {
        Value::Mapping(map) => map,
        Value::Scalar(Scalar::Null) => BTreeMap::new(),
        other => {
            return Err(ComposeError::Format {
                message: format!("top-level document must be a mapping, got {}", other.type_name()),
            });
        }
    };

    let version = match root.remove("version") {
        None | Some(Value::Scalar(Scalar::Null)) => String::new(),
        Some(Value::Scalar(Scalar::Int(_) | Scalar::Float(_))) => declared_version(bytes)?,
        Some(Value::Scalar(scalar)) => scalar.to_string(),
        Some(other) => {
            return Err(ComposeError::Format {
                message: format!("version must be a scalar, got {}", other.type_name()),
            });
        }
    };

    let major = major_version(&version)?;
    tracing::debug!(version = %version, major, "classified manifest version");

    let mut manifest = Manifest {
        version,
        ..Manifest::default()
    };

    if major < 2 {
        // Every remaining top-level key is a service.
        manifest.services = shape_services(root)?;
        return Ok(manifest);
    }

    if let Some(services) = root.remove("services") {
        manifest.services = shape_services(section("services", services)?)?;
    }
    if let Some(volumes) = root.remove("volumes") {
        manifest.volumes = section("volumes", volumes)?;
    }
    if let Some(networks) = root.remove("networks") {
        manifest.networks = section("networks", networks)?;
    }

    Ok(manifest)
}

/// Top-level `version` field read as its source text.
#[derive(Deserialize)]
struct DeclaredVersion {
    version: Option<String>,
}

/// Reads the `version` field without numeric reformatting, so `2.0`
/// stays `2.0` and `2.10` stays `2.10`.
fn declared_version(bytes: &[u8]) -> Result<String> {
    let declared: DeclaredVersion = serde_yaml::from_slice(bytes)?;
    Ok(declared.version.unwrap_or_default())
}

fn section(name: &str, value: Value) -> Result<BTreeMap<String, Value>> {
    match value {
        Value::Mapping(map) => Ok(map),
        Value::Scalar(Scalar::Null) => Ok(BTreeMap::new()),
        other => Err(ComposeError::Format {
            message: format!("{name} must be a mapping, got {}", other.type_name()),
        }),
    }
}

fn shape_services(entries: BTreeMap<String, Value>) -> Result<RawServiceMap> {
    entries
        .into_iter()
        .map(|(name, body)| {
            let service = into_raw_service(&name, body)?;
            Ok((name, service))
        })
        .collect()
}
