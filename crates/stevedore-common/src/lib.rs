//! # stevedore-common
//!
//! Shared error definitions and constants used across the entire
//! Stevedore workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives the merge engine and the CLI
//! build upon.

pub mod constants;
pub mod error;
