//! Capabilities the merge engine consumes from its caller.
//!
//! [`EnvironmentLookup`] answers variable names for interpolation and
//! [`ResourceLookup`] fetches files referenced by a manifest (currently
//! only `env_file`). Concrete implementations backed by the process
//! environment, in-memory maps, `.env` files, and the filesystem live here
//! too.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use stevedore_common::error::{ComposeError, Result};

/// Resolves variable names to values.
pub trait EnvironmentLookup {
    /// Returns the value of `name`, or `None` when it is not defined.
    fn lookup(&self, name: &str) -> Option<String>;
}

impl<F> EnvironmentLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Fetches files referenced from a manifest.
pub trait ResourceLookup {
    /// Returns the contents of `reference` and the path it resolved to.
    ///
    /// `referencing_file` is the manifest that contains the reference;
    /// relative references are resolved against its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be found or read.
    fn lookup(&self, reference: &str, referencing_file: &Path) -> Result<(Vec<u8>, PathBuf)>;
}

/// Reads variables from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEnvLookup;

impl EnvironmentLookup for OsEnvLookup {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Variables held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapEnvLookup {
    vars: BTreeMap<String, String>,
}

impl MapEnvLookup {
    /// Creates an empty lookup.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vars: BTreeMap::new(),
        }
    }

    /// Creates a lookup from an existing map.
    #[must_use]
    pub const fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Creates a lookup from `(name, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Number of defined variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` when no variable is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl EnvironmentLookup for MapEnvLookup {
    fn lookup(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Variables loaded from a `.env` file.
///
/// A missing file yields an empty lookup.
#[derive(Debug, Clone, Default)]
pub struct EnvFileLookup {
    path: PathBuf,
    vars: MapEnvLookup,
}

impl EnvFileLookup {
    /// Loads the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be read.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let vars = match std::fs::read_to_string(&path) {
            Ok(content) => parse_env_content(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MapEnvLookup::default(),
            Err(source) => return Err(ComposeError::Io { path, source }),
        };
        tracing::debug!(path = %path.display(), count = vars.len(), "loaded env file");
        Ok(Self { path, vars })
    }

    /// Path this lookup was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EnvironmentLookup for EnvFileLookup {
    fn lookup(&self, name: &str) -> Option<String> {
        self.vars.lookup(name)
    }
}

/// Parses `KEY=VALUE` lines; blank lines, `#` comments, and lines without
/// `=` are skipped and matching surrounding quotes are stripped.
#[must_use]
pub fn parse_env_content(content: &str) -> MapEnvLookup {
    let pairs = content.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (key, value) = line.split_once('=')?;
        Some((key.trim().to_owned(), unquote(value.trim()).to_owned()))
    });
    MapEnvLookup::from_pairs(pairs)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Tries several lookups in order; the first defined value wins.
#[derive(Default)]
pub struct ComposableEnvLookup {
    lookups: Vec<Box<dyn EnvironmentLookup + Send + Sync>>,
}

impl ComposableEnvLookup {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a lookup with lower priority than those already added.
    #[must_use]
    pub fn with(mut self, lookup: impl EnvironmentLookup + Send + Sync + 'static) -> Self {
        self.lookups.push(Box::new(lookup));
        self
    }
}

impl std::fmt::Debug for ComposableEnvLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposableEnvLookup")
            .field("lookups", &self.lookups.len())
            .finish()
    }
}

impl EnvironmentLookup for ComposableEnvLookup {
    fn lookup(&self, name: &str) -> Option<String> {
        self.lookups.iter().find_map(|l| l.lookup(name))
    }
}

/// Reads referenced files from disk relative to the referencing manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResourceLookup;

impl FileResourceLookup {
    /// Resolves `reference` against the directory of `referencing_file`.
    ///
    /// Absolute references are returned as-is and a leading `~/` is expanded
    /// from `HOME`.
    #[must_use]
    pub fn resolve(reference: &str, referencing_file: &Path) -> PathBuf {
        if let Some(rest) = reference.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        let path = Path::new(reference);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        referencing_file
            .parent()
            .map_or_else(|| path.to_path_buf(), |dir| dir.join(path))
    }
}

impl ResourceLookup for FileResourceLookup {
    fn lookup(&self, reference: &str, referencing_file: &Path) -> Result<(Vec<u8>, PathBuf)> {
        let resolved = Self::resolve(reference, referencing_file);
        tracing::debug!(reference, resolved = %resolved.display(), "reading resource");
        let content =
            std::fs::read(&resolved).map_err(|e| ComposeError::UnresolvableReference {
                file: referencing_file.to_path_buf(),
                message: format!("cannot read {}: {e}", resolved.display()),
            })?;
        Ok((content, resolved))
    }
}

/// Resources held in memory, keyed by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryResourceLookup {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryResourceLookup {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource.
    #[must_use]
    pub fn with(mut self, reference: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let _ = self.files.insert(reference.into(), content.into());
        self
    }
}

impl ResourceLookup for MemoryResourceLookup {
    fn lookup(&self, reference: &str, referencing_file: &Path) -> Result<(Vec<u8>, PathBuf)> {
        self.files.get(reference).map_or_else(
            || {
                Err(ComposeError::UnresolvableReference {
                    file: referencing_file.to_path_buf(),
                    message: format!("resource not found: {reference}"),
                })
            },
            |content| Ok((content.clone(), PathBuf::from(reference))),
        )
    }
}
