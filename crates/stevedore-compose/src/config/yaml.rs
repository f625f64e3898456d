//! Serde helpers for the loose shapes manifests allow.
//!
//! Many fields accept more than one spelling: a string or a list, a map or
//! a list of `KEY=VALUE` entries, a number or a string with a unit. These
//! helpers are plugged in with `#[serde(deserialize_with = ...)]` and always
//! produce one canonical typed form, which serializes back to a shape the
//! same helpers accept.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// A scalar read as text, whatever its YAML type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarString(pub String);

impl<'de> Deserialize<'de> for ScalarString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScalarVisitor;

        impl Visitor<'_> for ScalarVisitor {
            type Value = ScalarString;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number, or boolean")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(ScalarString(v))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(ScalarString),
    Many(Vec<ScalarString>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.0],
            Self::Many(items) => items.into_iter().map(|s| s.0).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MapOrList {
    Map(BTreeMap<String, Option<ScalarString>>),
    List(Vec<ScalarString>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Text(String),
}

/// Any scalar as an optional string.
pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<ScalarString>::deserialize(d)?.map(|s| s.0))
}

/// A single string or a list of strings.
pub fn string_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<StringOrList>::deserialize(d)?
        .map(StringOrList::into_vec)
        .unwrap_or_default())
}

/// A command: a list of arguments, or a string split with shell rules.
pub fn command<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    match Option::<StringOrList>::deserialize(d)? {
        None => Ok(Vec::new()),
        Some(StringOrList::One(s)) => split_command(&s.0).map_err(de::Error::custom),
        Some(list) => Ok(list.into_vec()),
    }
}

/// A map or a list of `KEY=VALUE` entries, flattened to the list form.
///
/// Map entries with a null value become a bare `KEY`.
pub fn map_or_equal_slice<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<MapOrList>::deserialize(d)? {
        None => Vec::new(),
        Some(MapOrList::Map(map)) => map
            .into_iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{k}={}", v.0),
                None => k,
            })
            .collect(),
        Some(MapOrList::List(items)) => items.into_iter().map(|s| s.0).collect(),
    })
}

/// A map or a list of `KEY=VALUE` entries, gathered into a map.
///
/// List entries without `=` map to an empty value.
pub fn slice_or_map<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    Ok(match Option::<MapOrList>::deserialize(d)? {
        None => BTreeMap::new(),
        Some(MapOrList::Map(map)) => map
            .into_iter()
            .map(|(k, v)| (k, v.map(|s| s.0).unwrap_or_default()))
            .collect(),
        Some(MapOrList::List(items)) => items
            .into_iter()
            .map(|s| match s.0.split_once('=') {
                Some((k, v)) => (k.to_owned(), v.to_owned()),
                None => (s.0, String::new()),
            })
            .collect(),
    })
}

/// An integer given either as a number or as a numeric string.
pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Option::<IntOrString>::deserialize(d)? {
        None => Ok(None),
        Some(IntOrString::Int(n)) => Ok(Some(n)),
        Some(IntOrString::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected an integer, got \"{s}\""))),
    }
}

/// A byte size given as a number or a string with a `b`/`k`/`m`/`g` unit.
pub fn opt_mem_bytes<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Option::<IntOrString>::deserialize(d)? {
        None => Ok(None),
        Some(IntOrString::Int(n)) => Ok(Some(n)),
        Some(IntOrString::Text(s)) => parse_bytes(&s).map(Some).map_err(de::Error::custom),
    }
}

/// Service names from a `depends_on` list, or the keys of the long form.
pub fn depends_on<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        List(Vec<ScalarString>),
        Map(BTreeMap<String, serde::de::IgnoredAny>),
    }

    Ok(match Option::<Repr>::deserialize(d)? {
        None => Vec::new(),
        Some(Repr::List(items)) => items.into_iter().map(|s| s.0).collect(),
        Some(Repr::Map(map)) => map.into_keys().collect(),
    })
}

/// Parses a human byte size such as `512m` or `1gb`.
///
/// # Errors
///
/// Returns a message if the number or the unit is invalid, or the result
/// overflows.
pub fn parse_bytes(input: &str) -> Result<i64, String> {
    let text = input.trim().to_ascii_lowercase();
    let digits_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(digits_end);
    let number: i64 = number
        .parse()
        .map_err(|_| format!("invalid size \"{input}\""))?;
    let multiplier: i64 = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" => 1 << 10,
        "m" | "mb" => 1 << 20,
        "g" | "gb" => 1 << 30,
        other => return Err(format!("invalid size unit \"{other}\" in \"{input}\"")),
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size \"{input}\" is too large"))
}

/// Splits a command string into arguments using shell quoting rules.
///
/// Single quotes are literal, double quotes honour `\` before `"`, `\`,
/// `$`, and `` ` ``, and an unquoted `\` escapes the next character.
///
/// # Errors
///
/// Returns a message if a quote is left open or the string ends in `\`.
pub fn split_command(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(format!("unterminated single quote in \"{input}\"")),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => {
                                return Err(format!("unterminated double quote in \"{input}\""));
                            }
                        },
                        Some(c) => current.push(c),
                        None => return Err(format!("unterminated double quote in \"{input}\"")),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => return Err(format!("trailing backslash in \"{input}\"")),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// `true` or a `{name}` mapping, as accepted by `external:`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalRepr {
    /// `external: true`
    Flag(bool),
    /// `external: {name: actual-name}`
    Named {
        /// Name of the pre-existing resource.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// A number or a `{soft, hard}` pair, as accepted by `ulimits:`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UlimitRepr {
    /// Same soft and hard limit.
    Single(i64),
    /// Distinct limits.
    Pair {
        /// Soft limit.
        soft: i64,
        /// Hard limit.
        hard: i64,
    },
}

/// Returns `true` for `false`, for `skip_serializing_if`.
#[allow(clippy::trivially_copy_pass_by_ref)]
pub const fn is_false(b: &bool) -> bool {
    !*b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "string_or_list")]
        list: Vec<String>,
        #[serde(default, deserialize_with = "command")]
        command: Vec<String>,
        #[serde(default, deserialize_with = "map_or_equal_slice")]
        env: Vec<String>,
        #[serde(default, deserialize_with = "slice_or_map")]
        labels: BTreeMap<String, String>,
        #[serde(default, deserialize_with = "opt_mem_bytes")]
        mem: Option<i64>,
        #[serde(default, deserialize_with = "opt_string")]
        text: Option<String>,
        #[serde(default, deserialize_with = "depends_on")]
        deps: Vec<String>,
    }

    fn probe(input: &str) -> Probe {
        serde_yaml::from_str(input).expect("should deserialize")
    }

    #[test]
    fn string_or_list_accepts_both() {
        assert_eq!(probe("list: a").list, vec!["a"]);
        assert_eq!(probe("list: [a, 1]").list, vec!["a", "1"]);
        assert!(probe("list:").list.is_empty());
    }

    #[test]
    fn command_string_is_shell_split() {
        let p = probe(r#"command: sh -c "echo 'hi there'""#);
        assert_eq!(p.command, vec!["sh", "-c", "echo 'hi there'"]);
        let p = probe("command: [echo, a b]");
        assert_eq!(p.command, vec!["echo", "a b"]);
    }

    #[test]
    fn environment_map_is_flattened() {
        let p = probe("env:\n  A: 1\n  B:\n  C: x=y");
        assert_eq!(p.env, vec!["A=1", "B", "C=x=y"]);
        assert_eq!(probe("env: [A=1, B]").env, vec!["A=1", "B"]);
    }

    #[test]
    fn labels_list_is_gathered() {
        let p = probe("labels: [a=1, b]");
        assert_eq!(p.labels.get("a").map(String::as_str), Some("1"));
        assert_eq!(p.labels.get("b").map(String::as_str), Some(""));
        let p = probe("labels:\n  tier: web");
        assert_eq!(p.labels.get("tier").map(String::as_str), Some("web"));
    }

    #[test]
    fn memory_accepts_units() {
        assert_eq!(probe("mem: 1024").mem, Some(1024));
        assert_eq!(probe("mem: 512m").mem, Some(512 * 1024 * 1024));
        assert_eq!(probe("mem: 1GB").mem, Some(1 << 30));
        assert!(serde_yaml::from_str::<Probe>("mem: 12q").is_err());
    }

    #[test]
    fn scalars_are_stringified() {
        assert_eq!(probe("text: false").text.as_deref(), Some("false"));
        assert_eq!(probe("text: 1000").text.as_deref(), Some("1000"));
        assert_eq!(probe("text: no").text.as_deref(), Some("no"));
    }

    #[test]
    fn depends_on_accepts_long_form() {
        assert_eq!(probe("deps: [db, cache]").deps, vec!["db", "cache"]);
        let p = probe("deps:\n  db:\n    condition: service_healthy");
        assert_eq!(p.deps, vec!["db"]);
    }

    #[test]
    fn split_command_handles_escapes() {
        assert_eq!(
            split_command(r"echo a\ b").expect("ok"),
            vec!["echo", "a b"]
        );
        assert_eq!(
            split_command(r#"echo "say \"hi\"""#).expect("ok"),
            vec!["echo", "say \"hi\""]
        );
        assert_eq!(split_command("  ").expect("ok"), Vec::<String>::new());
        assert_eq!(split_command("''").expect("ok"), vec![""]);
    }

    #[test]
    fn split_command_rejects_open_quotes() {
        assert!(split_command("echo 'oops").is_err());
        assert!(split_command("echo \"oops").is_err());
        assert!(split_command("echo \\").is_err());
    }

    #[test]
    fn parse_bytes_overflow() {
        assert!(parse_bytes("99999999999999999g").is_err());
    }
}
