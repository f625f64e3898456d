//! The legacy (version 1) service shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ServiceConfig, yaml};

/// A version 1 service.
///
/// Differs from [`ServiceConfig`] only in the fields listed here; all other
/// fields share the version 2 spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfigV1 {
    /// Build context path.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub build: Option<String>,
    /// Dockerfile relative to `build`.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub dockerfile: Option<String>,
    /// Log driver name.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub log_driver: Option<String>,
    /// Log driver options.
    #[serde(
        default,
        deserialize_with = "yaml::slice_or_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub log_opt: BTreeMap<String, String>,
    /// Network mode.
    #[serde(
        default,
        deserialize_with = "yaml::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub net: Option<String>,
    /// Fields spelled the same way in both versions.
    #[serde(flatten)]
    pub shared: ServiceConfig,
}

impl ServiceConfigV1 {
    /// Widens this service into the version 2 shape.
    ///
    /// Legacy fields take precedence over any version 2 spelling of the same
    /// setting found in `shared`.
    #[must_use]
    pub fn into_v2(self) -> ServiceConfig {
        let mut config = self.shared;

        if self.build.is_some() || self.dockerfile.is_some() {
            let mut build = config.build.take().unwrap_or_default();
            if self.build.is_some() {
                build.context = self.build;
            }
            if self.dockerfile.is_some() {
                build.dockerfile = self.dockerfile;
            }
            config.build = Some(build);
        }

        if self.log_driver.is_some() || !self.log_opt.is_empty() {
            let mut logging = config.logging.take().unwrap_or_default();
            if self.log_driver.is_some() {
                logging.driver = self.log_driver;
            }
            logging.options.extend(self.log_opt);
            config.logging = Some(logging);
        }

        if self.net.is_some() {
            config.network_mode = self.net;
        }

        config
    }
}

impl From<ServiceConfigV1> for ServiceConfig {
    fn from(v1: ServiceConfigV1) -> Self {
        v1.into_v2()
    }
}
