//! Field-by-field merge of raw definitions.
//!
//! Applied when a later manifest redefines a service already known from an
//! earlier one. Sequences are concatenated (base first), mappings are
//! merged key by key, and everything else is replaced by the incoming
//! value. `links` and `volumes_from` are always replaced wholesale.
//!
//! The policy is order-sensitive: only strict left-to-right application is
//! meaningful.

use std::collections::BTreeMap;

use stevedore_common::constants::NON_MERGEABLE_FIELDS;

use crate::value::{RawService, Value};

/// Returns `true` for fields replaced instead of merged.
#[must_use]
pub fn is_non_mergeable(field: &str) -> bool {
    NON_MERGEABLE_FIELDS.contains(&field)
}

/// Merges `incoming` onto `base` and returns the result.
#[must_use]
pub fn merge_config(base: RawService, incoming: RawService) -> RawService {
    merge_mapping(base, incoming)
}

/// Merges two values found under `field`.
#[must_use]
pub fn merge_value(field: &str, existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Sequence(mut base), Value::Sequence(extra)) if !is_non_mergeable(field) => {
            base.extend(extra);
            Value::Sequence(base)
        }
        (Value::Mapping(base), Value::Mapping(extra)) => Value::Mapping(merge_mapping(base, extra)),
        (_, incoming) => incoming,
    }
}

fn merge_mapping(
    mut base: BTreeMap<String, Value>,
    incoming: BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    for (key, value) in incoming {
        let merged = match base.remove(&key) {
            Some(existing) => merge_value(&key, existing, value),
            None => value,
        };
        let _ = base.insert(key, merged);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(fields: &[(&str, Value)]) -> RawService {
        fields
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn new_fields_are_added() {
        let base = service(&[("image", Value::string("nginx"))]);
        let incoming = service(&[("tty", Value::from(true))]);
        let merged = merge_config(base, incoming);
        assert_eq!(merged["image"], Value::string("nginx"));
        assert_eq!(merged["tty"], Value::from(true));
    }

    #[test]
    fn sequences_concatenate_in_order() {
        let base = service(&[("ports", Value::from(vec![Value::from(80)]))]);
        let incoming = service(&[("ports", Value::from(vec![Value::from(8080)]))]);
        let merged = merge_config(base, incoming);
        assert_eq!(
            merged["ports"],
            Value::from(vec![Value::from(80), Value::from(8080)])
        );
    }

    #[test]
    fn links_are_replaced() {
        let base = service(&[("links", Value::from(vec!["y"]))]);
        let incoming = service(&[("links", Value::from(vec!["x"]))]);
        let merged = merge_config(base, incoming);
        assert_eq!(merged["links"], Value::from(vec!["x"]));
    }

    #[test]
    fn volumes_from_are_replaced() {
        let base = service(&[("volumes_from", Value::from(vec!["a", "b"]))]);
        let incoming = service(&[("volumes_from", Value::from(vec!["c"]))]);
        let merged = merge_config(base, incoming);
        assert_eq!(merged["volumes_from"], Value::from(vec!["c"]));
    }

    #[test]
    fn scalars_are_overridden() {
        let base = service(&[("image", Value::string("nginx:1"))]);
        let incoming = service(&[("image", Value::string("nginx:2"))]);
        let merged = merge_config(base, incoming);
        assert_eq!(merged["image"], Value::string("nginx:2"));
    }

    #[test]
    fn type_mismatch_takes_incoming() {
        let base = service(&[("command", Value::from(vec!["echo", "hi"]))]);
        let incoming = service(&[("command", Value::string("sleep 1"))]);
        let merged = merge_config(base, incoming);
        assert_eq!(merged["command"], Value::string("sleep 1"));
    }

    #[test]
    fn mappings_merge_recursively() {
        let base = service(&[(
            "build",
            Value::Mapping(BTreeMap::from([
                ("context".to_owned(), Value::string(".")),
                (
                    "args".to_owned(),
                    Value::Mapping(BTreeMap::from([("A".to_owned(), Value::string("1"))])),
                ),
            ])),
        )]);
        let incoming = service(&[(
            "build",
            Value::Mapping(BTreeMap::from([(
                "args".to_owned(),
                Value::Mapping(BTreeMap::from([("B".to_owned(), Value::string("2"))])),
            )])),
        )]);
        let merged = merge_config(base, incoming);
        let build = merged["build"].as_mapping().expect("mapping");
        assert_eq!(build["context"], Value::string("."));
        let args = build["args"].as_mapping().expect("mapping");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn empty_base_is_left_identity() {
        let incoming = service(&[
            ("image", Value::string("redis")),
            ("ports", Value::from(vec!["6379"])),
        ]);
        let merged = merge_config(RawService::new(), incoming.clone());
        assert_eq!(merged, incoming);
    }

    #[test]
    fn left_to_right_order_is_preserved() {
        let a = service(&[("dns", Value::from(vec!["a"]))]);
        let b = service(&[("dns", Value::from(vec!["b"]))]);
        let c = service(&[("dns", Value::from(vec!["c"]))]);
        let merged = merge_config(merge_config(a, b), c);
        assert_eq!(merged["dns"], Value::from(vec!["a", "b", "c"]));
    }
}
