//! Resolution of `env_file` references into the `environment` field.
//!
//! Precedence, highest first: explicit `environment` entries, then the
//! last-listed env file, down to the first-listed one. The first entry to
//! claim a key wins.

use std::path::Path;

use stevedore_common::error::{ComposeError, Result};

use crate::lookup::ResourceLookup;
use crate::value::{RawService, Scalar, Value};

/// Service field listing env files.
pub const ENV_FILE_FIELD: &str = "env_file";

/// Service field holding environment entries.
pub const ENVIRONMENT_FIELD: &str = "environment";

/// Merges the service's env files into its `environment` field.
///
/// Services without `env_file`, or with an empty list, are returned
/// unchanged.
///
/// # Errors
///
/// Returns an unresolvable-reference error when env files are declared but
/// no `resource_lookup` was supplied or a file cannot be fetched, and a
/// conversion error when `env_file` or `environment` has an unexpected
/// shape.
pub fn read_env_file(
    resource_lookup: Option<&dyn ResourceLookup>,
    manifest_path: &Path,
    mut service: RawService,
) -> Result<RawService> {
    let Some(declared) = service.get(ENV_FILE_FIELD) else {
        return Ok(service);
    };
    let env_files = string_or_list(ENV_FILE_FIELD, declared)?;
    if env_files.is_empty() {
        return Ok(service);
    }

    let Some(resource_lookup) = resource_lookup else {
        return Err(ComposeError::UnresolvableReference {
            file: manifest_path.to_path_buf(),
            message: "env_file is used but no mechanism was provided to load files".into(),
        });
    };

    let mut vars = match service.get(ENVIRONMENT_FIELD) {
        Some(environment) => environment_entries(environment)?,
        None => Vec::new(),
    };

    for env_file in env_files.iter().rev() {
        let (content, resolved) = resource_lookup.lookup(env_file, manifest_path)?;
        tracing::debug!(env_file = %resolved.display(), "merging env file");
        let content = String::from_utf8(content).map_err(|e| ComposeError::UnresolvableReference {
            file: manifest_path.to_path_buf(),
            message: format!("{} is not valid UTF-8: {e}", resolved.display()),
        })?;

        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let key = key_prefix(line);
            if !vars.iter().any(|v| v.starts_with(key)) {
                vars.push(line.to_owned());
            }
        }
    }

    let _ = service.insert(ENVIRONMENT_FIELD.to_owned(), Value::from(vars));
    Ok(service)
}

/// Text up to and including the first `=`, or the whole line.
fn key_prefix(line: &str) -> &str {
    line.find('=').map_or(line, |idx| &line[..=idx])
}

fn string_or_list(field: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Scalar(Scalar::Null) => Ok(Vec::new()),
        Value::Scalar(scalar) => Ok(vec![scalar.to_string()]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Value::Scalar(scalar) => Ok(scalar.to_string()),
                other => Err(shape_error(field, other)),
            })
            .collect(),
        Value::Mapping(_) => Err(shape_error(field, value)),
    }
}

/// Flattens `environment` into `KEY=VALUE` entries.
///
/// A mapping entry with a null value becomes a bare `KEY`.
fn environment_entries(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Mapping(map) => Ok(map
            .iter()
            .map(|(key, value)| match value {
                Value::Scalar(Scalar::Null) => key.clone(),
                Value::Scalar(scalar) => format!("{key}={scalar}"),
                other => format!("{key}={}", other.type_name()),
            })
            .collect()),
        other => string_or_list(ENVIRONMENT_FIELD, other),
    }
}

fn shape_error(field: &str, value: &Value) -> ComposeError {
    ComposeError::conversion(
        field,
        format!("expected a string or a list of strings, got {}", value.type_name()),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use stevedore_common::error::ErrorKind;

    use super::*;
    use crate::lookup::MemoryResourceLookup;

    fn manifest() -> &'static Path {
        Path::new("docker-compose.yml")
    }

    fn environment(service: &RawService) -> Vec<String> {
        service[ENVIRONMENT_FIELD]
            .as_sequence()
            .expect("sequence")
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn without_env_file_service_is_unchanged() {
        let service = RawService::from([("image".to_owned(), Value::string("nginx"))]);
        let out = read_env_file(None, manifest(), service.clone()).expect("ok");
        assert_eq!(out, service);
    }

    #[test]
    fn empty_env_file_list_needs_no_lookup() {
        let service = RawService::from([(ENV_FILE_FIELD.to_owned(), Value::Sequence(Vec::new()))]);
        let out = read_env_file(None, manifest(), service.clone()).expect("ok");
        assert_eq!(out, service);
    }

    #[test]
    fn missing_lookup_is_unresolvable() {
        let service = RawService::from([(ENV_FILE_FIELD.to_owned(), Value::string("a.env"))]);
        let err = read_env_file(None, manifest(), service).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvableReference);
        assert!(err.to_string().contains("docker-compose.yml"), "got: {err}");
    }

    #[test]
    fn explicit_environment_wins_and_later_files_win() {
        let resources = MemoryResourceLookup::new()
            .with("f1", "A=2\n")
            .with("f2", "B=3\n");
        let service = RawService::from([
            (ENVIRONMENT_FIELD.to_owned(), Value::from(vec!["A=1"])),
            (ENV_FILE_FIELD.to_owned(), Value::from(vec!["f1", "f2"])),
        ]);
        let out = read_env_file(Some(&resources), manifest(), service).expect("ok");
        assert_eq!(environment(&out), vec!["A=1", "B=3"]);
    }

    #[test]
    fn last_listed_file_claims_shared_keys() {
        let resources = MemoryResourceLookup::new()
            .with("first.env", "SHARED=first\nONLY_FIRST=1\n")
            .with("second.env", "SHARED=second\n");
        let service = RawService::from([(
            ENV_FILE_FIELD.to_owned(),
            Value::from(vec!["first.env", "second.env"]),
        )]);
        let out = read_env_file(Some(&resources), manifest(), service).expect("ok");
        assert_eq!(environment(&out), vec!["SHARED=second", "ONLY_FIRST=1"]);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let resources = MemoryResourceLookup::new().with("a.env", "# header\n\n  A=1  \n#B=2\n");
        let service = RawService::from([(ENV_FILE_FIELD.to_owned(), Value::string("a.env"))]);
        let out = read_env_file(Some(&resources), manifest(), service).expect("ok");
        assert_eq!(environment(&out), vec!["A=1"]);
    }

    #[test]
    fn mapping_environment_is_flattened() {
        let resources = MemoryResourceLookup::new().with("a.env", "A=file\nC=3\n");
        let env = Value::Mapping(BTreeMap::from([
            ("A".to_owned(), Value::string("map")),
            ("B".to_owned(), Value::null()),
            ("PORT".to_owned(), Value::from(80)),
        ]));
        let service = RawService::from([
            (ENVIRONMENT_FIELD.to_owned(), env),
            (ENV_FILE_FIELD.to_owned(), Value::string("a.env")),
        ]);
        let out = read_env_file(Some(&resources), manifest(), service).expect("ok");
        assert_eq!(environment(&out), vec!["A=map", "B", "PORT=80", "C=3"]);
    }

    #[test]
    fn lines_without_equals_use_whole_line_as_key() {
        let resources = MemoryResourceLookup::new().with("a.env", "DEBUG\nDEBUG\n");
        let service = RawService::from([(ENV_FILE_FIELD.to_owned(), Value::string("a.env"))]);
        let out = read_env_file(Some(&resources), manifest(), service).expect("ok");
        assert_eq!(environment(&out), vec!["DEBUG"]);
    }

    #[test]
    fn failed_lookup_propagates() {
        let resources = MemoryResourceLookup::new();
        let service = RawService::from([(ENV_FILE_FIELD.to_owned(), Value::string("gone.env"))]);
        let err = read_env_file(Some(&resources), manifest(), service).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvableReference);
    }

    #[test]
    fn mapping_env_file_is_rejected() {
        let resources = MemoryResourceLookup::new();
        let service = RawService::from([(
            ENV_FILE_FIELD.to_owned(),
            Value::Mapping(BTreeMap::new()),
        )]);
        let err = read_env_file(Some(&resources), manifest(), service).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
    }
}
