//! Untyped nested values carried through interpolation and merge.
//!
//! A [`Value`] is what a service field looks like before structural
//! conversion: a scalar, an ordered sequence, or a string-keyed mapping.
//! Values are built from `serde_yaml` documents and turned back into them
//! when the typed configuration is deserialized.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use stevedore_common::error::{ComposeError, Result};

/// A single service definition prior to structural conversion.
pub type RawService = BTreeMap<String, Value>;

/// Service name to raw service definition.
pub type RawServiceMap = BTreeMap<String, RawService>;

/// A leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// YAML `null`, `~`, or an empty value.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal.
    String(String),
}

/// Untyped nested value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Leaf value.
    Scalar(Scalar),
    /// Ordered sequence.
    Sequence(Vec<Value>),
    /// String-keyed mapping.
    Mapping(BTreeMap<String, Value>),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl Value {
    /// Shorthand for a string scalar.
    pub fn string(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(s.into()))
    }

    /// Shorthand for the null scalar.
    #[must_use]
    pub const fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    /// Returns `true` for the null scalar.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    /// Returns the string content if this is a string scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the scalar if this value is one.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is a sequence.
    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Self]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the entries if this is a mapping.
    #[must_use]
    pub const fn as_mapping(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar(Scalar::Null) => "null",
            Self::Scalar(Scalar::Bool(_)) => "boolean",
            Self::Scalar(Scalar::Int(_) | Scalar::Float(_)) => "number",
            Self::Scalar(Scalar::String(_)) => "string",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }

    /// Builds a value from a parsed YAML node.
    ///
    /// Scalar mapping keys are stringified; tags are dropped.
    ///
    /// # Errors
    ///
    /// Returns a format error if a mapping key is itself a sequence or mapping.
    pub fn from_yaml(node: serde_yaml::Value) -> Result<Self> {
        Ok(match node {
            serde_yaml::Value::Null => Self::null(),
            serde_yaml::Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            serde_yaml::Value::Number(n) => Self::Scalar(number_to_scalar(&n)),
            serde_yaml::Value::String(s) => Self::string(s),
            serde_yaml::Value::Sequence(items) => Self::Sequence(
                items
                    .into_iter()
                    .map(Self::from_yaml)
                    .collect::<Result<_>>()?,
            ),
            serde_yaml::Value::Mapping(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let _ = map.insert(key_to_string(key)?, Self::from_yaml(value)?);
                }
                Self::Mapping(map)
            }
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(tagged.value)?,
        })
    }

    /// Converts this value back into a YAML node.
    #[must_use]
    pub fn into_yaml(self) -> serde_yaml::Value {
        match self {
            Self::Scalar(Scalar::Null) => serde_yaml::Value::Null,
            Self::Scalar(Scalar::Bool(b)) => serde_yaml::Value::Bool(b),
            Self::Scalar(Scalar::Int(n)) => serde_yaml::Value::Number(n.into()),
            Self::Scalar(Scalar::Float(x)) => serde_yaml::Value::Number(x.into()),
            Self::Scalar(Scalar::String(s)) => serde_yaml::Value::String(s),
            Self::Sequence(items) => {
                serde_yaml::Value::Sequence(items.into_iter().map(Self::into_yaml).collect())
            }
            Self::Mapping(map) => serde_yaml::Value::Mapping(
                map.into_iter()
                    .map(|(k, v)| (serde_yaml::Value::String(k), v.into_yaml()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Scalar(Scalar::Int(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Scalar(Scalar::Bool(b))
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Sequence(items.into_iter().map(Into::into).collect())
    }
}

fn number_to_scalar(n: &serde_yaml::Number) -> Scalar {
    if let Some(i) = n.as_i64() {
        Scalar::Int(i)
    } else {
        Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn key_to_string(key: serde_yaml::Value) -> Result<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Tagged(tagged) => key_to_string(tagged.value),
        serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => {
            Err(ComposeError::Format {
                message: "mapping keys must be scalars".into(),
            })
        }
    }
}

/// Deserializes a typed configuration out of a raw value.
///
/// # Errors
///
/// Returns a conversion error naming `field` if the shapes do not match.
pub fn convert<T: DeserializeOwned>(field: &str, value: Value) -> Result<T> {
    serde_yaml::from_value(value.into_yaml()).map_err(|e| ComposeError::conversion(field, e))
}

/// Serializes a typed configuration back into a raw value.
///
/// # Errors
///
/// Returns a conversion error naming `field` if serialization fails.
pub fn to_raw<T: Serialize>(field: &str, config: &T) -> Result<Value> {
    let node = serde_yaml::to_value(config).map_err(|e| ComposeError::conversion(field, e))?;
    Value::from_yaml(node)
}

/// Splits a raw mapping value into a raw service.
///
/// A null body yields an empty service.
///
/// # Errors
///
/// Returns a format error if the value is neither a mapping nor null.
pub fn into_raw_service(name: &str, value: Value) -> Result<RawService> {
    match value {
        Value::Mapping(map) => Ok(map),
        Value::Scalar(Scalar::Null) => Ok(RawService::new()),
        other => Err(ComposeError::Format {
            message: format!(
                "service \"{name}\" must be a mapping, got {}",
                other.type_name()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Value {
        let node: serde_yaml::Value = serde_yaml::from_str(input).expect("valid yaml");
        Value::from_yaml(node).expect("convertible")
    }

    #[test]
    fn scalars_keep_their_type() {
        let value = parse("a: 1\nb: true\nc: text\nd: 1.5\ne:");
        let map = value.as_mapping().expect("mapping");
        assert_eq!(map["a"], Value::Scalar(Scalar::Int(1)));
        assert_eq!(map["b"], Value::Scalar(Scalar::Bool(true)));
        assert_eq!(map["c"], Value::string("text"));
        assert_eq!(map["d"], Value::Scalar(Scalar::Float(1.5)));
        assert!(map["e"].is_null());
    }

    #[test]
    fn numeric_keys_are_stringified() {
        let value = parse("8080: http\ntrue: yes");
        let map = value.as_mapping().expect("mapping");
        assert_eq!(map["8080"], Value::string("http"));
        assert!(map.contains_key("true"));
    }

    #[test]
    fn complex_keys_are_rejected() {
        let node: serde_yaml::Value = serde_yaml::from_str("? [a, b]\n: c").expect("valid yaml");
        assert!(Value::from_yaml(node).is_err());
    }

    #[test]
    fn sequence_order_is_preserved() {
        let value = parse("[c, a, b]");
        let items = value.as_sequence().expect("sequence");
        let names: Vec<_> = items.iter().filter_map(Value::as_str).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn scalar_display_matches_yaml_text() {
        assert_eq!(Scalar::Bool(false).to_string(), "false");
        assert_eq!(Scalar::Int(80).to_string(), "80");
        assert_eq!(Scalar::Null.to_string(), "");
    }

    #[test]
    fn null_service_body_is_empty() {
        let service = into_raw_service("web", Value::null()).expect("null is allowed");
        assert!(service.is_empty());
    }

    #[test]
    fn scalar_service_body_is_rejected() {
        let err = into_raw_service("web", Value::string("nginx")).unwrap_err();
        assert!(err.to_string().contains("\"web\""), "got: {err}");
    }
}
