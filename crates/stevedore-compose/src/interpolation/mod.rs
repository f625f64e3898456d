//! Variable substitution over untyped values.
//!
//! Strings are tokenized by [`lexer`] and every reference is resolved
//! through an [`EnvironmentLookup`]. Sequences and mappings are rebuilt
//! with substituted leaves; mapping keys and non-string scalars are left
//! alone.

pub mod lexer;

use std::collections::BTreeMap;

use stevedore_common::error::{ComposeError, Result};

use self::lexer::{Modifier, Segment};
use crate::lookup::EnvironmentLookup;
use crate::value::{RawServiceMap, Scalar, Value};

/// Behaviour for references to variables that are not defined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UndefinedVariablePolicy {
    /// Substitute an empty string and log a warning.
    #[default]
    Empty,
    /// Fail the interpolation.
    Error,
}

/// Substitutes every reference inside a single string.
///
/// Strings without a `$` are returned unchanged without consulting the
/// lookup.
///
/// # Errors
///
/// Returns an interpolation error if the string contains a malformed
/// reference, a `${NAME?message}` reference to an unset variable, or (with
/// [`UndefinedVariablePolicy::Error`]) any reference to an unset variable.
pub fn interpolate_str(
    field: &str,
    input: &str,
    lookup: &dyn EnvironmentLookup,
    policy: UndefinedVariablePolicy,
) -> Result<String> {
    if !input.contains('$') {
        return Ok(input.to_owned());
    }

    let segments = lexer::tokenize(input).map_err(|rest| ComposeError::Interpolation {
        field: field.to_owned(),
        message: format!("malformed reference at \"{rest}\" in \"{input}\""),
    })?;

    let mut output = String::with_capacity(input.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => output.push_str(text),
            Segment::Dollar => output.push('$'),
            Segment::Variable { name, modifier } => {
                output.push_str(&resolve(field, name, modifier, lookup, policy)?);
            }
        }
    }
    Ok(output)
}

fn resolve(
    field: &str,
    name: &str,
    modifier: Option<Modifier<'_>>,
    lookup: &dyn EnvironmentLookup,
    policy: UndefinedVariablePolicy,
) -> Result<String> {
    let found = lookup.lookup(name);
    match modifier {
        Some(Modifier::Default { word, when_empty }) => Ok(match found {
            Some(v) if !(when_empty && v.is_empty()) => v,
            _ => word.to_owned(),
        }),
        Some(Modifier::Required {
            message,
            when_empty,
        }) => match found {
            Some(v) if !(when_empty && v.is_empty()) => Ok(v),
            _ => Err(ComposeError::Interpolation {
                field: field.to_owned(),
                message: if message.is_empty() {
                    format!("required variable {name} is missing a value")
                } else {
                    format!("required variable {name} is missing a value: {message}")
                },
            }),
        },
        None => match (found, policy) {
            (Some(v), _) => Ok(v),
            (None, UndefinedVariablePolicy::Empty) => {
                tracing::warn!(
                    variable = name,
                    field,
                    "variable is not set, substituting a blank string"
                );
                Ok(String::new())
            }
            (None, UndefinedVariablePolicy::Error) => Err(ComposeError::Interpolation {
                field: field.to_owned(),
                message: format!("variable {name} is not set"),
            }),
        },
    }
}

/// Substitutes references inside `value` in place, recursing into
/// sequences and mappings.
///
/// # Errors
///
/// Propagates the first failure from [`interpolate_str`].
pub fn interpolate(
    field: &str,
    value: &mut Value,
    lookup: &dyn EnvironmentLookup,
    policy: UndefinedVariablePolicy,
) -> Result<()> {
    match value {
        Value::Scalar(Scalar::String(s)) => {
            *s = interpolate_str(field, s, lookup, policy)?;
        }
        Value::Scalar(_) => {}
        Value::Sequence(items) => {
            for item in items {
                interpolate(field, item, lookup, policy)?;
            }
        }
        Value::Mapping(map) => {
            for item in map.values_mut() {
                interpolate(field, item, lookup, policy)?;
            }
        }
    }
    Ok(())
}

/// Interpolates every entry of a top-level section such as `volumes`.
///
/// # Errors
///
/// Propagates the first failure from [`interpolate`].
pub fn interpolate_map(
    entries: &mut BTreeMap<String, Value>,
    lookup: &dyn EnvironmentLookup,
    policy: UndefinedVariablePolicy,
) -> Result<()> {
    for (name, value) in entries.iter_mut() {
        interpolate(name, value, lookup, policy)?;
    }
    Ok(())
}

/// Interpolates every field of every service.
///
/// # Errors
///
/// Propagates the first failure from [`interpolate`].
pub fn interpolate_raw_service_map(
    services: &mut RawServiceMap,
    lookup: &dyn EnvironmentLookup,
    policy: UndefinedVariablePolicy,
) -> Result<()> {
    for (service, fields) in services.iter_mut() {
        for (key, value) in fields.iter_mut() {
            interpolate(&format!("{service}.{key}"), value, lookup, policy)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use stevedore_common::error::ErrorKind;

    use super::*;
    use crate::lookup::MapEnvLookup;

    fn env() -> MapEnvLookup {
        MapEnvLookup::from_pairs([("TAG", "1.25"), ("EMPTY", ""), ("PORT", "8080")])
    }

    fn sub(input: &str) -> Result<String> {
        interpolate_str("test", input, &env(), UndefinedVariablePolicy::Empty)
    }

    #[test]
    fn substitutes_bare_and_braced() {
        assert_eq!(sub("nginx:$TAG").expect("ok"), "nginx:1.25");
        assert_eq!(sub("nginx:${TAG}-alpine").expect("ok"), "nginx:1.25-alpine");
    }

    #[test]
    fn undefined_substitutes_empty_by_default() {
        assert_eq!(sub("a${MISSING}b").expect("ok"), "ab");
    }

    #[test]
    fn undefined_fails_with_strict_policy() {
        let err = interpolate_str("web.image", "${MISSING}", &env(), UndefinedVariablePolicy::Error)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interpolation);
        assert!(err.to_string().contains("MISSING"), "got: {err}");
        assert!(err.to_string().contains("web.image"), "got: {err}");
    }

    #[test]
    fn defaults_distinguish_unset_and_empty() {
        assert_eq!(sub("${EMPTY:-d}").expect("ok"), "d");
        assert_eq!(sub("${EMPTY-d}").expect("ok"), "");
        assert_eq!(sub("${MISSING-d}").expect("ok"), "d");
        assert_eq!(sub("${TAG:-d}").expect("ok"), "1.25");
    }

    #[test]
    fn required_variables() {
        assert!(sub("${MISSING?}").is_err());
        assert!(sub("${EMPTY:?must be set}").is_err());
        assert_eq!(sub("${EMPTY?}").expect("ok"), "");
        let err = sub("${MISSING:?set it}").unwrap_err();
        assert!(err.to_string().contains("set it"), "got: {err}");
    }

    #[test]
    fn escaped_dollar_is_literal() {
        assert_eq!(sub("echo $$HOME").expect("ok"), "echo $HOME");
    }

    #[test]
    fn malformed_reference_is_an_error() {
        let err = sub("${oops").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interpolation);
    }

    #[test]
    fn text_without_references_is_unchanged() {
        let panicking = |_: &str| -> Option<String> { unreachable!("lookup must not be called") };
        let out = interpolate_str("f", "plain text", &panicking, UndefinedVariablePolicy::Error)
            .expect("ok");
        assert_eq!(out, "plain text");
    }

    #[test]
    fn recurses_into_nested_values() {
        let mut value = Value::Mapping(BTreeMap::from([
            ("image".to_owned(), Value::string("app:${TAG}")),
            (
                "ports".to_owned(),
                Value::from(vec![Value::string("${PORT}:80"), Value::from(443)]),
            ),
            ("tty".to_owned(), Value::from(true)),
        ]));
        interpolate("web", &mut value, &env(), UndefinedVariablePolicy::Empty).expect("ok");
        let map = value.as_mapping().expect("mapping");
        assert_eq!(map["image"], Value::string("app:1.25"));
        assert_eq!(
            map["ports"],
            Value::from(vec![Value::string("8080:80"), Value::from(443)])
        );
        assert_eq!(map["tty"], Value::from(true));
    }

    #[test]
    fn value_without_references_is_identity() {
        let original = Value::Mapping(BTreeMap::from([
            ("command".to_owned(), Value::from(vec!["echo", "hi"])),
            ("labels".to_owned(), Value::Mapping(BTreeMap::new())),
        ]));
        let mut value = original.clone();
        interpolate("svc", &mut value, &env(), UndefinedVariablePolicy::Error).expect("ok");
        assert_eq!(value, original);
    }

    #[test]
    fn raw_service_map_interpolation_reports_service_field() {
        let mut services = RawServiceMap::from([(
            "web".to_owned(),
            BTreeMap::from([("image".to_owned(), Value::string("${NOPE}"))]),
        )]);
        let err =
            interpolate_raw_service_map(&mut services, &env(), UndefinedVariablePolicy::Error)
                .unwrap_err();
        assert!(err.to_string().contains("web.image"), "got: {err}");
    }
}
