//! Rendering of the merged configuration.

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::Serialize;
use stevedore_compose::{NetworkConfig, Project, ServiceConfig, VolumeConfig};

/// Serialization format for `config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML document.
    Yaml,
    /// Pretty-printed JSON.
    Json,
}

/// The merged project as a single document.
#[derive(Debug, Serialize)]
pub struct ConfigDocument<'a> {
    /// Declared version of the last manifest.
    #[serde(skip_serializing_if = "str::is_empty")]
    pub version: &'a str,
    /// Merged services.
    pub services: &'a BTreeMap<String, ServiceConfig>,
    /// Top-level volumes.
    #[serde(skip_serializing_if = "is_empty_map")]
    pub volumes: &'a BTreeMap<String, VolumeConfig>,
    /// Top-level networks.
    #[serde(skip_serializing_if = "is_empty_map")]
    pub networks: &'a BTreeMap<String, NetworkConfig>,
}

impl<'a> ConfigDocument<'a> {
    /// Borrows the document out of a loaded project.
    #[must_use]
    pub fn from_project(project: &'a Project) -> Self {
        Self {
            version: project.version(),
            services: project.services().as_map(),
            volumes: project.volumes(),
            networks: project.networks(),
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_empty_map<V>(map: &&BTreeMap<String, V>) -> bool {
    map.is_empty()
}

/// Serializes `value` in the requested format, with a trailing newline.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    let mut text = match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
    };
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}
