//! Normalization of the `extends` shorthand.
//!
//! `extends: base` is rewritten to `extends: {service: base}` so that the
//! inheritance pass only ever sees the structured form.

use std::collections::BTreeMap;

use crate::value::{RawServiceMap, Scalar, Value};

/// Service field declaring inheritance.
pub const EXTENDS_FIELD: &str = "extends";

/// Rewrites every scalar `extends` value into `{service: <name>}`.
///
/// Values already in structured form are left untouched.
pub fn normalize_extends(services: &mut RawServiceMap) {
    for (name, fields) in services.iter_mut() {
        let Some(extends) = fields.get_mut(EXTENDS_FIELD) else {
            continue;
        };
        if let Value::Scalar(Scalar::String(target)) = extends {
            tracing::debug!(service = %name, target = %target, "normalizing extends shorthand");
            let service = Value::string(std::mem::take(target));
            *extends = Value::Mapping(BTreeMap::from([("service".to_owned(), service)]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::RawService;

    fn service_with_extends(value: Value) -> RawServiceMap {
        let fields = RawService::from([
            ("image".to_owned(), Value::string("nginx")),
            (EXTENDS_FIELD.to_owned(), value),
        ]);
        RawServiceMap::from([("web".to_owned(), fields)])
    }

    #[test]
    fn shorthand_becomes_structured() {
        let mut services = service_with_extends(Value::string("base"));
        normalize_extends(&mut services);
        let expected = Value::Mapping(BTreeMap::from([(
            "service".to_owned(),
            Value::string("base"),
        )]));
        assert_eq!(services["web"][EXTENDS_FIELD], expected);
    }

    #[test]
    fn shorthand_and_structured_forms_match() {
        let mut shorthand = service_with_extends(Value::string("base"));
        let mut structured = service_with_extends(Value::Mapping(BTreeMap::from([(
            "service".to_owned(),
            Value::string("base"),
        )])));
        normalize_extends(&mut shorthand);
        normalize_extends(&mut structured);
        assert_eq!(shorthand, structured);
    }

    #[test]
    fn structured_form_keeps_file() {
        let structured = Value::Mapping(BTreeMap::from([
            ("service".to_owned(), Value::string("base")),
            ("file".to_owned(), Value::string("common.yml")),
        ]));
        let mut services = service_with_extends(structured.clone());
        normalize_extends(&mut services);
        assert_eq!(services["web"][EXTENDS_FIELD], structured);
    }

    #[test]
    fn services_without_extends_are_untouched() {
        let mut services = RawServiceMap::from([(
            "db".to_owned(),
            RawService::from([("image".to_owned(), Value::string("postgres"))]),
        )]);
        let before = services.clone();
        normalize_extends(&mut services);
        assert_eq!(services, before);
    }
}
