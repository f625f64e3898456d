//! # stevedore-compose
//!
//! Loader and merge engine for compose-style multi-service manifests.
//!
//! Handles:
//! - **Loader**: YAML parsing and schema version classification.
//! - **Interpolation**: `$VAR` / `${VAR:-default}` substitution over untyped values.
//! - **Extends**: normalization of the `extends` shorthand.
//! - **Merge**: field-by-field merge of partial service definitions.
//! - **Env files**: resolution of `env_file` into `environment`.
//! - **Adapter**: version 1 widening, value fixes, and typed conversion.
//! - **Project**: accumulation of several manifests into one configuration.
//! - **Graph**: dependency ordering of services.

pub mod adapter;
pub mod config;
pub mod env_file;
pub mod extends;
pub mod graph;
pub mod interpolation;
pub mod loader;
pub mod lookup;
pub mod merge;
pub mod options;
pub mod project;
pub mod validator;
pub mod value;

pub use adapter::{MergeOutput, merge};
pub use config::{NetworkConfig, ServiceConfig, ServiceConfigs, VolumeConfig};
pub use options::ParseOptions;
pub use project::{Project, ProjectContext};
