//! Per-manifest merge pipeline and version adapter.
//!
//! [`merge`] takes one manifest's bytes and the services accumulated from
//! earlier manifests, and returns the typed configuration that results from
//! applying the manifest on top of them. Nothing is committed here; the
//! caller decides what to do with the output.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use stevedore_common::error::{ComposeError, Result};

use crate::config::{NetworkConfig, ServiceConfig, ServiceConfigV1, ServiceConfigs, VolumeConfig};
use crate::env_file::read_env_file;
use crate::extends::normalize_extends;
use crate::interpolation::{interpolate_map, interpolate_raw_service_map};
use crate::loader::{SchemaVersion, create_config};
use crate::lookup::{EnvironmentLookup, ResourceLookup};
use crate::merge::merge_config;
use crate::options::ParseOptions;
use crate::validator::validate;
use crate::value::{RawService, RawServiceMap, Value, convert, into_raw_service, to_raw};

/// Result of merging one manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutput {
    /// Version string as declared by the manifest.
    pub version: String,
    /// Every service the manifest defines, merged onto its earlier definition.
    pub services: BTreeMap<String, ServiceConfig>,
    /// Top-level volumes declared by the manifest.
    pub volumes: BTreeMap<String, VolumeConfig>,
    /// Top-level networks declared by the manifest.
    pub networks: BTreeMap<String, NetworkConfig>,
}

/// Merges one manifest onto the services accumulated so far.
///
/// The stages run in order: load and classify, normalize `extends`,
/// interpolate, preprocess hook, validate, merge onto `existing`, resolve
/// env files, convert to the version 2 shape, adjust values, postprocess
/// hook, and finally convert volumes and networks.
///
/// # Errors
///
/// Fails on the first error of any stage. Version 3 manifests are rejected
/// with [`ComposeError::UnsupportedVersion`].
pub fn merge(
    existing: &ServiceConfigs,
    environment_lookup: &dyn EnvironmentLookup,
    resource_lookup: Option<&dyn ResourceLookup>,
    file: &Path,
    bytes: &[u8],
    options: &ParseOptions,
) -> Result<MergeOutput> {
    tracing::info!(file = %file.display(), "merging manifest");

    let mut manifest = create_config(bytes)?;
    let schema = manifest.schema_version()?;
    normalize_extends(&mut manifest.services);

    if options.interpolate {
        interpolate_raw_service_map(&mut manifest.services, environment_lookup, options.undefined)?;
        interpolate_map(&mut manifest.volumes, environment_lookup, options.undefined)?;
        interpolate_map(&mut manifest.networks, environment_lookup, options.undefined)?;
    }

    let mut raw_services = manifest.services;
    if let Some(preprocess) = &options.preprocess {
        raw_services = preprocess(raw_services)?;
    }

    if options.validate {
        validate(&raw_services)?;
    }

    let mut services = match schema {
        SchemaVersion::V3 => {
            return Err(ComposeError::UnsupportedVersion {
                version: manifest.version,
            });
        }
        SchemaVersion::V2 => merge_services_v2(existing, resource_lookup, file, raw_services)?,
        SchemaVersion::V1 => merge_services_v1(existing, resource_lookup, file, raw_services)?,
    };

    adjust_values(&mut services);

    if let Some(postprocess) = &options.postprocess {
        services = postprocess(services)?;
    }

    let volumes = convert_section(manifest.volumes)?;
    let networks = convert_section(manifest.networks)?;

    tracing::debug!(
        services = services.len(),
        volumes = volumes.len(),
        networks = networks.len(),
        "manifest merged"
    );

    Ok(MergeOutput {
        version: manifest.version,
        services,
        volumes,
        networks,
    })
}

/// Merges version 2 raw services and converts them.
///
/// # Errors
///
/// Propagates env-file and conversion failures.
pub fn merge_services_v2(
    existing: &ServiceConfigs,
    resource_lookup: Option<&dyn ResourceLookup>,
    file: &Path,
    raw_services: RawServiceMap,
) -> Result<BTreeMap<String, ServiceConfig>> {
    raw_services
        .into_iter()
        .map(|(name, data)| {
            let config = merge_service(existing, resource_lookup, file, &name, data)?;
            Ok((name, config))
        })
        .collect()
}

/// Widens version 1 raw services, then merges and converts them.
///
/// Each incoming service is first read as a [`ServiceConfigV1`] and widened
/// with [`ServiceConfigV1::into_v2`], so that the merge only ever sees the
/// version 2 spelling.
///
/// # Errors
///
/// Propagates env-file and conversion failures.
pub fn merge_services_v1(
    existing: &ServiceConfigs,
    resource_lookup: Option<&dyn ResourceLookup>,
    file: &Path,
    raw_services: RawServiceMap,
) -> Result<BTreeMap<String, ServiceConfig>> {
    raw_services
        .into_iter()
        .map(|(name, data)| {
            let legacy: ServiceConfigV1 = convert(&name, Value::Mapping(data))?;
            let widened = into_raw_service(&name, to_raw(&name, &legacy.into_v2())?)?;
            let config = merge_service(existing, resource_lookup, file, &name, widened)?;
            Ok((name, config))
        })
        .collect()
}

fn merge_service(
    existing: &ServiceConfigs,
    resource_lookup: Option<&dyn ResourceLookup>,
    file: &Path,
    name: &str,
    data: RawService,
) -> Result<ServiceConfig> {
    let data = match existing.get(name) {
        Some(previous) => {
            tracing::debug!(service = name, "merging onto existing definition");
            let base = into_raw_service(name, to_raw(name, previous)?)?;
            merge_config(base, data)
        }
        None => data,
    };
    let data = read_env_file(resource_lookup, file, data)?;
    convert(name, Value::Mapping(data))
}

/// Repairs scalar coercions that lose meaning on the way through YAML.
///
/// A boolean `restart: false` arrives as the string `"false"` and is turned
/// back into the `"no"` policy.
pub fn adjust_values(services: &mut BTreeMap<String, ServiceConfig>) {
    for (name, config) in services.iter_mut() {
        if config.restart.as_deref() == Some("false") {
            tracing::debug!(service = %name, "rewriting restart policy \"false\" to \"no\"");
            config.restart = Some("no".to_owned());
        }
    }
}

fn convert_section<T>(entries: BTreeMap<String, Value>) -> Result<BTreeMap<String, T>>
where
    T: DeserializeOwned + Default,
{
    entries
        .into_iter()
        .map(|(name, value)| {
            let config = if value.is_null() {
                T::default()
            } else {
                convert(&name, value)?
            };
            Ok((name, config))
        })
        .collect()
}
