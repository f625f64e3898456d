//! Structural validation of raw service definitions.
//!
//! Catches shapes that would otherwise surface as confusing conversion
//! errors, or not at all, before any merge happens.

use stevedore_common::constants::RESTART_POLICIES;
use stevedore_common::error::{ComposeError, Result};

use crate::extends::EXTENDS_FIELD;
use crate::value::{RawService, RawServiceMap, Scalar, Value};

/// Validates every service of a raw service map.
///
/// # Checks performed
///
/// 1. Service names only use `[a-zA-Z0-9._-]`.
/// 2. `extends` is a mapping with a string `service`.
/// 3. `restart` is a known policy.
/// 4. `ports` entries are numbers or strings.
/// 5. `links`, `volumes_from`, and `depends_on` are lists of strings
///    (`depends_on` may also be a mapping).
///
/// # Errors
///
/// Returns a validation error naming the first offending service.
pub fn validate(services: &RawServiceMap) -> Result<()> {
    tracing::info!(count = services.len(), "validating services");
    for (name, service) in services {
        check_name(name)?;
        check_extends(name, service)?;
        check_restart(name, service)?;
        check_ports(name, service)?;
        for field in ["links", "volumes_from"] {
            check_string_list(name, field, service.get(field))?;
        }
        check_depends_on(name, service)?;
    }
    Ok(())
}

fn invalid(service: &str, message: impl Into<String>) -> ComposeError {
    ComposeError::Validation {
        service: service.to_owned(),
        message: message.into(),
    }
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(is_name_char) {
        return Err(invalid(
            name,
            "service names may only contain [a-zA-Z0-9._-]",
        ));
    }
    Ok(())
}

fn check_extends(name: &str, service: &RawService) -> Result<()> {
    let Some(extends) = service.get(EXTENDS_FIELD) else {
        return Ok(());
    };
    let target = extends
        .as_mapping()
        .and_then(|m| m.get("service"))
        .and_then(Value::as_str);
    if target.is_none() {
        return Err(invalid(
            name,
            "extends must name a service, as a string or {service: <name>}",
        ));
    }
    Ok(())
}

fn is_restart_policy(policy: &str) -> bool {
    if policy == "false" || RESTART_POLICIES.contains(&policy) {
        return true;
    }
    policy
        .strip_prefix("on-failure:")
        .is_some_and(|n| n.parse::<u32>().is_ok())
}

fn check_restart(name: &str, service: &RawService) -> Result<()> {
    match service.get("restart") {
        None | Some(Value::Scalar(Scalar::Null | Scalar::Bool(false))) => Ok(()),
        Some(Value::Scalar(Scalar::String(policy))) if is_restart_policy(policy) => Ok(()),
        Some(other) => Err(invalid(
            name,
            format!("invalid restart policy {other:?}"),
        )),
    }
}

fn check_ports(name: &str, service: &RawService) -> Result<()> {
    let Some(ports) = service.get("ports") else {
        return Ok(());
    };
    let Some(entries) = ports.as_sequence() else {
        return Err(invalid(
            name,
            format!("ports must be a list, got {}", ports.type_name()),
        ));
    };
    for entry in entries {
        if !matches!(
            entry,
            Value::Scalar(Scalar::Int(_) | Scalar::String(_))
        ) {
            return Err(invalid(
                name,
                format!("ports entries must be numbers or strings, got {}", entry.type_name()),
            ));
        }
    }
    Ok(())
}

fn check_string_list(name: &str, field: &str, value: Option<&Value>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let is_string_list = value
        .as_sequence()
        .is_some_and(|items| items.iter().all(|v| v.as_str().is_some()));
    if !is_string_list {
        return Err(invalid(
            name,
            format!("{field} must be a list of strings, got {}", value.type_name()),
        ));
    }
    Ok(())
}

fn check_depends_on(name: &str, service: &RawService) -> Result<()> {
    match service.get("depends_on") {
        Some(Value::Mapping(_)) => Ok(()),
        other => check_string_list(name, "depends_on", other),
    }
}
