//! Structured, version-independent configuration.
//!
//! These types are what the merge engine hands to the orchestration layer.
//! They are produced from fully merged raw definitions by deserializing
//! through the helpers in [`yaml`], and serialize back into raw form when a
//! later manifest needs to be merged onto them.

pub mod v1;
pub mod yaml;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use self::v1::ServiceConfigV1;
use self::yaml::{ExternalRepr, UlimitRepr, is_false};

/// Image build settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Build context directory or URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Dockerfile path relative to the context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    /// Build-time arguments.
    #[serde(
        default,
        deserialize_with = "yaml::slice_or_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub args: BTreeMap<String, String>,
}

impl Build {
    /// Returns `true` when the context is fetched remotely rather than read
    /// from disk.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.context.as_deref().is_some_and(is_valid_remote)
    }
}

const URL_PREFIXES: &[&str] = &["http://", "https://"];
const GIT_PREFIXES: &[&str] = &["git://", "github.com/", "git@"];

/// Checks whether a build context names an HTTP(S) URL or a git remote.
#[must_use]
pub fn is_valid_remote(remote: &str) -> bool {
    is_url(remote) || is_git_url(remote)
}

fn is_url(s: &str) -> bool {
    URL_PREFIXES.iter().any(|prefix| s.starts_with(prefix))
}

/// A `.git` suffix may carry a `#ref` fragment.
fn is_git_url(s: &str) -> bool {
    if GIT_PREFIXES.iter().any(|prefix| s.starts_with(prefix)) {
        return true;
    }
    let path = match s.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => path,
        Some(_) => return false,
        None => s,
    };
    is_url(s) && path.ends_with(".git")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BuildRepr {
    Context(String),
    Full(Build),
}

fn opt_build<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<Build>, D::Error> {
    Ok(Option::<BuildRepr>::deserialize(d)?.map(|repr| match repr {
        BuildRepr::Context(context) => Build {
            context: Some(context),
            ..Build::default()
        },
        BuildRepr::Full(build) => build,
    }))
}

/// Log driver settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logging {
    /// Driver name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options.
    #[serde(
        default,
        deserialize_with = "yaml::slice_or_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub options: BTreeMap<String, String>,
}

/// Canonical `extends` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extends {
    /// Service to inherit from.
    pub service: String,
    /// Manifest containing that service, if not the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Per-network settings of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNetwork {
    /// Extra host names on this network.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Static IPv4 address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    /// Static IPv6 address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServiceNetworksRepr {
    List(Vec<String>),
    Map(BTreeMap<String, Option<ServiceNetwork>>),
}

fn service_networks<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, ServiceNetwork>, D::Error> {
    Ok(match Option::<ServiceNetworksRepr>::deserialize(d)? {
        None => BTreeMap::new(),
        Some(ServiceNetworksRepr::List(names)) => names
            .into_iter()
            .map(|name| (name, ServiceNetwork::default()))
            .collect(),
        Some(ServiceNetworksRepr::Map(map)) => map
            .into_iter()
            .map(|(name, settings)| (name, settings.unwrap_or_default()))
            .collect(),
    })
}

/// Resource limit for a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "UlimitRepr")]
pub struct Ulimit {
    /// Soft limit.
    pub soft: i64,
    /// Hard limit.
    pub hard: i64,
}

impl From<UlimitRepr> for Ulimit {
    fn from(repr: UlimitRepr) -> Self {
        match repr {
            UlimitRepr::Single(n) => Self { soft: n, hard: n },
            UlimitRepr::Pair { soft, hard } => Self { soft, hard },
        }
    }
}

/// One service, in the version 2 shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Image build settings.
    #[serde(default, deserialize_with = "opt_build", skip_serializing_if = "Option::is_none")]
    pub build: Option<Build>,
    /// Added kernel capabilities.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub cap_add: Vec<String>,
    /// Dropped kernel capabilities.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub cap_drop: Vec<String>,
    /// Parent cgroup.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub cgroup_parent: Option<String>,
    /// Command overriding the image default.
    #[serde(default, deserialize_with = "yaml::command", skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Explicit container name.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub container_name: Option<String>,
    /// Relative CPU weight.
    #[serde(default, deserialize_with = "yaml::opt_int", skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<i64>,
    /// CPU CFS quota in microseconds.
    #[serde(default, deserialize_with = "yaml::opt_int", skip_serializing_if = "Option::is_none")]
    pub cpu_quota: Option<i64>,
    /// CPUs the container may run on.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub cpuset: Option<String>,
    /// Services started before this one.
    #[serde(default, deserialize_with = "yaml::depends_on", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Host device mappings.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub devices: Vec<String>,
    /// DNS servers.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub dns: Vec<String>,
    /// Resolver options.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub dns_opt: Vec<String>,
    /// DNS search domains.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub dns_search: Vec<String>,
    /// Domain name.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub domainname: Option<String>,
    /// Entrypoint overriding the image default.
    #[serde(default, deserialize_with = "yaml::command", skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    /// Env files merged into `environment`.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub env_file: Vec<String>,
    /// `KEY=VALUE` (or bare `KEY`) environment entries.
    #[serde(
        default,
        deserialize_with = "yaml::map_or_equal_slice",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub environment: Vec<String>,
    /// Ports exposed to linked services only.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub expose: Vec<String>,
    /// Inheritance declaration, in canonical form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<Extends>,
    /// Links to containers outside the project.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub external_links: Vec<String>,
    /// Extra `/etc/hosts` entries.
    #[serde(
        default,
        deserialize_with = "yaml::map_or_equal_slice",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub extra_hosts: Vec<String>,
    /// Supplementary groups for the container user.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub group_add: Vec<String>,
    /// Container host name.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub hostname: Option<String>,
    /// Image reference.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,
    /// IPC namespace mode.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub ipc: Option<String>,
    /// Container labels.
    #[serde(
        default,
        deserialize_with = "yaml::slice_or_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub labels: BTreeMap<String, String>,
    /// Links to other services (`service[:alias]`).
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub links: Vec<String>,
    /// Log driver settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
    /// MAC address.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub mac_address: Option<String>,
    /// Memory limit in bytes.
    #[serde(
        default,
        deserialize_with = "yaml::opt_mem_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub mem_limit: Option<i64>,
    /// Anonymous page swapping tendency, 0 to 100.
    #[serde(default, deserialize_with = "yaml::opt_int", skip_serializing_if = "Option::is_none")]
    pub mem_swappiness: Option<i64>,
    /// Memory plus swap limit in bytes.
    #[serde(
        default,
        deserialize_with = "yaml::opt_mem_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub memswap_limit: Option<i64>,
    /// Network mode (`bridge`, `host`, `service:x`, `container:x`).
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub network_mode: Option<String>,
    /// Networks the service joins.
    #[serde(
        default,
        deserialize_with = "service_networks",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub networks: BTreeMap<String, ServiceNetwork>,
    /// Keep the OOM killer away from this container.
    #[serde(default, skip_serializing_if = "is_false")]
    pub oom_kill_disable: bool,
    /// OOM killer preference adjustment.
    #[serde(default, deserialize_with = "yaml::opt_int", skip_serializing_if = "Option::is_none")]
    pub oom_score_adj: Option<i64>,
    /// PID namespace mode.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub pid: Option<String>,
    /// Published ports.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ports: Vec<String>,
    /// Run with extended privileges.
    #[serde(default, skip_serializing_if = "is_false")]
    pub privileged: bool,
    /// Mount the root filesystem read-only.
    #[serde(default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    /// Restart policy (`no`, `always`, `on-failure[:n]`, `unless-stopped`).
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub restart: Option<String>,
    /// Security options.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub security_opt: Vec<String>,
    /// Size of `/dev/shm` in bytes.
    #[serde(
        default,
        deserialize_with = "yaml::opt_mem_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub shm_size: Option<i64>,
    /// Keep stdin open.
    #[serde(default, skip_serializing_if = "is_false")]
    pub stdin_open: bool,
    /// Signal used to stop the container.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_signal: Option<String>,
    /// tmpfs mounts.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tmpfs: Vec<String>,
    /// Allocate a TTY.
    #[serde(default, skip_serializing_if = "is_false")]
    pub tty: bool,
    /// Process resource limits.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ulimits: BTreeMap<String, Ulimit>,
    /// User to run as.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub user: Option<String>,
    /// UTS namespace mode.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub uts: Option<String>,
    /// Default volume driver.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub volume_driver: Option<String>,
    /// Volume mounts.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub volumes: Vec<String>,
    /// Services or containers to borrow volumes from.
    #[serde(
        default,
        deserialize_with = "yaml::string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub volumes_from: Vec<String>,
    /// Working directory.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub working_dir: Option<String>,
}

/// Marks a volume or network as pre-existing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ExternalRepr", into = "ExternalRepr")]
pub struct External {
    /// Whether the resource is created outside the project.
    pub external: bool,
    /// Actual name of the resource, when it differs from the key.
    pub name: Option<String>,
}

impl From<ExternalRepr> for External {
    fn from(repr: ExternalRepr) -> Self {
        match repr {
            ExternalRepr::Flag(external) => Self {
                external,
                name: None,
            },
            ExternalRepr::Named { name } => Self {
                external: true,
                name,
            },
        }
    }
}

impl From<External> for ExternalRepr {
    fn from(external: External) -> Self {
        match external.name {
            Some(name) => Self::Named { name: Some(name) },
            None => Self::Flag(external.external),
        }
    }
}

/// A top-level volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Volume driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options.
    #[serde(
        default,
        deserialize_with = "yaml::slice_or_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub driver_opts: BTreeMap<String, String>,
    /// Pre-existing volume marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<External>,
}

/// One IPAM address pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamConfig {
    /// Subnet in CIDR notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    /// Range to allocate container addresses from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
    /// Gateway address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Auxiliary addresses used by the driver.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aux_addresses: BTreeMap<String, String>,
}

/// IP address management settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipam {
    /// IPAM driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Address pools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<IpamConfig>,
}

/// A top-level network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options.
    #[serde(
        default,
        deserialize_with = "yaml::slice_or_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub driver_opts: BTreeMap<String, String>,
    /// Pre-existing network marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<External>,
    /// IP address management.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
}

/// Structured services accumulated across manifests, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfigs {
    services: BTreeMap<String, ServiceConfig>,
}

impl ServiceConfigs {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the service named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name)
    }

    /// Stores `config` under `name`, replacing any previous definition.
    pub fn insert(&mut self, name: impl Into<String>, config: ServiceConfig) {
        let _ = self.services.insert(name.into(), config);
    }

    /// Returns `true` if a service named `name` is stored.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Service names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// `(name, config)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceConfig)> {
        self.services.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of stored services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` when no service is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Borrows the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<String, ServiceConfig> {
        &self.services
    }
}

impl From<BTreeMap<String, ServiceConfig>> for ServiceConfigs {
    fn from(services: BTreeMap<String, ServiceConfig>) -> Self {
        Self { services }
    }
}

impl FromIterator<(String, ServiceConfig)> for ServiceConfigs {
    fn from_iter<I: IntoIterator<Item = (String, ServiceConfig)>>(iter: I) -> Self {
        Self {
            services: iter.into_iter().collect(),
        }
    }
}
