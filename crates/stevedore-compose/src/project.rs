//! Project session: accumulates services across manifests.
//!
//! A [`Project`] owns the merged state. Each manifest is merged against the
//! services collected so far and its output is committed only when the whole
//! merge succeeds, so a failing manifest leaves the project untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use stevedore_common::constants::DEFAULT_ENV_FILE;
use stevedore_common::error::{ComposeError, Result};

use crate::adapter::{MergeOutput, merge};
use crate::config::{NetworkConfig, ServiceConfig, ServiceConfigs, VolumeConfig};
use crate::graph::DependencyGraph;
use crate::lookup::{
    ComposableEnvLookup, EnvFileLookup, EnvironmentLookup, FileResourceLookup, OsEnvLookup,
    ResourceLookup,
};
use crate::options::ParseOptions;

/// Boxed environment lookup owned by a project.
pub type BoxedEnvironmentLookup = Box<dyn EnvironmentLookup + Send + Sync>;

/// Boxed resource lookup owned by a project.
pub type BoxedResourceLookup = Box<dyn ResourceLookup + Send + Sync>;

/// Everything needed to build and load a [`Project`].
#[derive(Default)]
pub struct ProjectContext {
    /// Explicit project name; derived from the first file's directory if unset.
    pub project_name: Option<String>,
    /// Manifest files, merged in order.
    pub compose_files: Vec<PathBuf>,
    /// In-memory manifests as `(file name, bytes)`, merged after the files.
    pub compose_bytes: Vec<(PathBuf, Vec<u8>)>,
    /// Variable source; defaults to the process environment, then `.env`.
    pub environment_lookup: Option<BoxedEnvironmentLookup>,
    /// File source for `env_file`; defaults to the filesystem.
    pub resource_lookup: Option<BoxedResourceLookup>,
    /// Options applied to every manifest.
    pub options: ParseOptions,
}

impl fmt::Debug for ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectContext")
            .field("project_name", &self.project_name)
            .field("compose_files", &self.compose_files)
            .field("compose_bytes", &self.compose_bytes.len())
            .field("environment_lookup", &self.environment_lookup.is_some())
            .field("resource_lookup", &self.resource_lookup.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl ProjectContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project name.
    #[must_use]
    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    /// Appends a manifest file.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.compose_files.push(path.into());
        self
    }

    /// Appends an in-memory manifest.
    #[must_use]
    pub fn bytes(mut self, name: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.compose_bytes.push((name.into(), bytes.into()));
        self
    }

    /// Replaces the environment lookup.
    #[must_use]
    pub fn environment_lookup(
        mut self,
        lookup: impl EnvironmentLookup + Send + Sync + 'static,
    ) -> Self {
        self.environment_lookup = Some(Box::new(lookup));
        self
    }

    /// Replaces the resource lookup.
    #[must_use]
    pub fn resource_lookup(mut self, lookup: impl ResourceLookup + Send + Sync + 'static) -> Self {
        self.resource_lookup = Some(Box::new(lookup));
        self
    }

    /// Replaces the parse options.
    #[must_use]
    pub fn options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }
}

/// Merged configuration of a set of manifests.
pub struct Project {
    name: String,
    version: String,
    services: ServiceConfigs,
    volumes: BTreeMap<String, VolumeConfig>,
    networks: BTreeMap<String, NetworkConfig>,
    files: Vec<PathBuf>,
    compose_files: Vec<PathBuf>,
    compose_bytes: Vec<(PathBuf, Vec<u8>)>,
    environment_lookup: BoxedEnvironmentLookup,
    resource_lookup: BoxedResourceLookup,
    options: ParseOptions,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("services", &self.services.len())
            .field("volumes", &self.volumes.len())
            .field("networks", &self.networks.len())
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Creates an empty project reading the process environment and the
    /// filesystem.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_name(name),
            version: String::new(),
            services: ServiceConfigs::new(),
            volumes: BTreeMap::new(),
            networks: BTreeMap::new(),
            files: Vec::new(),
            compose_files: Vec::new(),
            compose_bytes: Vec::new(),
            environment_lookup: Box::new(OsEnvLookup),
            resource_lookup: Box::new(FileResourceLookup),
            options: ParseOptions::default(),
        }
    }

    /// Creates a project from a context, filling in default lookups.
    ///
    /// Without an explicit environment lookup, variables come from the
    /// process environment and then from a `.env` file next to the first
    /// manifest.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no usable project name can be
    /// derived, or an I/O error if the `.env` file exists but is unreadable.
    pub fn from_context(context: ProjectContext) -> Result<Self> {
        let ProjectContext {
            project_name,
            compose_files,
            compose_bytes,
            environment_lookup,
            resource_lookup,
            options,
        } = context;

        let name = match project_name {
            Some(name) => normalize_name(&name),
            None => normalize_name(&default_project_name(compose_files.first())?),
        };
        if name.is_empty() {
            return Err(ComposeError::Config {
                message: "project name is empty after normalization".into(),
            });
        }

        let environment_lookup: BoxedEnvironmentLookup = match environment_lookup {
            Some(lookup) => lookup,
            None => {
                let env_file = base_dir(compose_files.first()).join(DEFAULT_ENV_FILE);
                Box::new(
                    ComposableEnvLookup::new()
                        .with(OsEnvLookup)
                        .with(EnvFileLookup::load(env_file)?),
                )
            }
        };

        tracing::info!(project = %name, files = compose_files.len(), "creating project");

        Ok(Self {
            name,
            version: String::new(),
            services: ServiceConfigs::new(),
            volumes: BTreeMap::new(),
            networks: BTreeMap::new(),
            files: Vec::new(),
            compose_files,
            compose_bytes,
            environment_lookup,
            resource_lookup: resource_lookup.unwrap_or_else(|| Box::new(FileResourceLookup)),
            options,
        })
    }

    /// Reads and merges every configured manifest in order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the project has no manifests, an
    /// I/O error if a file cannot be read, and any merge error.
    pub fn load(&mut self) -> Result<()> {
        if self.compose_files.is_empty() && self.compose_bytes.is_empty() {
            return Err(ComposeError::Config {
                message: "no compose file specified".into(),
            });
        }

        for path in self.compose_files.clone() {
            let bytes = std::fs::read(&path).map_err(|source| ComposeError::Io {
                path: path.clone(),
                source,
            })?;
            self.add_config_bytes(&path, &bytes)?;
        }

        for (name, bytes) in self.compose_bytes.clone() {
            self.add_config_bytes(&name, &bytes)?;
        }
        Ok(())
    }

    /// Merges one manifest into the project.
    ///
    /// # Errors
    ///
    /// Propagates the merge error; the project is left unchanged.
    pub fn add_config_bytes(&mut self, file: &Path, bytes: &[u8]) -> Result<()> {
        let environment_lookup: &dyn EnvironmentLookup = &*self.environment_lookup;
        let resource_lookup: &dyn ResourceLookup = &*self.resource_lookup;
        let output = merge(
            &self.services,
            environment_lookup,
            Some(resource_lookup),
            file,
            bytes,
            &self.options,
        )?;
        self.commit(file, output);
        Ok(())
    }

    fn commit(&mut self, file: &Path, output: MergeOutput) {
        tracing::debug!(
            file = %file.display(),
            services = output.services.len(),
            "committing manifest"
        );
        self.version = output.version;
        for (name, config) in output.services {
            self.services.insert(name, config);
        }
        self.volumes.extend(output.volumes);
        self.networks.extend(output.networks);
        self.files.push(file.to_path_buf());
    }

    /// Normalized project name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared version of the most recently merged manifest.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Merged services.
    #[must_use]
    pub const fn services(&self) -> &ServiceConfigs {
        &self.services
    }

    /// Returns the merged service named `name`.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name)
    }

    /// Merged top-level volumes.
    #[must_use]
    pub const fn volumes(&self) -> &BTreeMap<String, VolumeConfig> {
        &self.volumes
    }

    /// Merged top-level networks.
    #[must_use]
    pub const fn networks(&self) -> &BTreeMap<String, NetworkConfig> {
        &self.networks
    }

    /// Service names in sorted order.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().map(str::to_owned).collect()
    }

    /// Service names with dependencies first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the services depend on each other
    /// in a cycle.
    pub fn service_order(&self) -> Result<Vec<String>> {
        DependencyGraph::from_services(&self.services).resolve_order()
    }

    /// Manifests merged so far, in order.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Lowercases `name` and drops everything outside `[a-z0-9]`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

fn base_dir(first_file: Option<&PathBuf>) -> PathBuf {
    first_file
        .and_then(|file| file.parent())
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn default_project_name(first_file: Option<&PathBuf>) -> Result<String> {
    let dir = base_dir(first_file);
    let dir = dir.canonicalize().map_err(|source| ComposeError::Io {
        path: dir.clone(),
        source,
    })?;
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ComposeError::Config {
            message: format!("cannot derive a project name from {}", dir.display()),
        })
}
