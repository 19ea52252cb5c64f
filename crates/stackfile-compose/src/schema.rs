//! Structural validation of the generic tree.
//!
//! Checks every node against the recognized keys for its context, enforces
//! value shapes (scalar vs list vs mapping), and rejects mutually
//! exclusive field combinations. Pure check: the tree is never modified.
//!
//! Validation is independent per service. The first error of each service
//! is recorded and the remaining services are still checked, so one pass
//! can report several unrelated mistakes.

use serde_yaml::{Mapping, Value};
use stackfile_common::error::{ComposeError, ErrorSet, Result};
use stackfile_common::types::RestartPolicy;

use crate::loader::{get, scalar_to_string};

const TOP_LEVEL_KEYS: &[&str] = &[
    "name", "version", "services", "networks", "volumes", "configs", "secrets",
];

const SERVICE_KEYS: &[&str] = &[
    "image",
    "build",
    "command",
    "entrypoint",
    "environment",
    "env_file",
    "labels",
    "label_file",
    "depends_on",
    "links",
    "external_links",
    "volumes",
    "volumes_from",
    "ports",
    "expose",
    "networks",
    "network_mode",
    "restart",
    "extends",
    "configs",
    "secrets",
    "deploy",
    "healthcheck",
    "user",
    "working_dir",
    "hostname",
    "container_name",
    "stop_grace_period",
];

const NETWORK_KEYS: &[&str] = &[
    "driver",
    "driver_opts",
    "external",
    "attachable",
    "internal",
    "labels",
    "name",
];

const VOLUME_KEYS: &[&str] = &["driver", "driver_opts", "external", "labels", "name"];

/// Shared by `configs` and `secrets` top-level declarations.
const FILE_OBJECT_KEYS: &[&str] = &["file", "external", "name"];

const EXTENDS_KEYS: &[&str] = &["service", "file"];
const DEPENDENCY_KEYS: &[&str] = &["condition", "restart", "required"];
const BUILD_KEYS: &[&str] = &["context", "dockerfile", "args", "target", "labels"];
const PORT_KEYS: &[&str] = &["target", "published", "protocol", "host_ip", "mode"];
const MOUNT_KEYS: &[&str] = &["type", "source", "target", "read_only"];
const ATTACHMENT_KEYS: &[&str] = &["aliases", "ipv4_address", "ipv6_address"];
const GRANT_KEYS: &[&str] = &["source", "target", "uid", "gid", "mode"];
const HEALTHCHECK_KEYS: &[&str] = &[
    "test",
    "interval",
    "timeout",
    "retries",
    "start_period",
    "disable",
];
const DEPLOY_KEYS: &[&str] = &["resources", "replicas"];
const RESOURCES_KEYS: &[&str] = &["limits", "reservations"];
const LIMIT_KEYS: &[&str] = &["cpus", "memory", "pids"];

/// Validates the whole document against the recognized-key tables.
///
/// # Errors
///
/// Returns every independent [`ComposeError::Schema`] and
/// [`ComposeError::Conflict`] found, one per service at most plus any
/// top-level failures.
pub fn validate(doc: &Mapping) -> Result<(), ErrorSet> {
    tracing::debug!("validating document schema");
    let mut errors = ErrorSet::new();

    for key in doc.keys() {
        let Some(name) = scalar_to_string(key) else {
            errors.push(schema_err("", "top-level keys must be strings"));
            continue;
        };
        if !TOP_LEVEL_KEYS.contains(&name.as_str()) {
            errors.push(schema_err(&name, "unrecognized top-level key"));
        }
    }

    for key in ["name", "version"] {
        if let Some(value) = get(doc, key) {
            if let Err(err) = expect_scalar(key, value) {
                errors.push(err);
            }
        }
    }

    validate_services(doc, &mut errors);
    validate_section(doc, "networks", NETWORK_KEYS, &mut errors);
    validate_section(doc, "volumes", VOLUME_KEYS, &mut errors);
    validate_file_objects(doc, "configs", &mut errors);
    validate_file_objects(doc, "secrets", &mut errors);

    errors.into_result(())
}

fn validate_services(doc: &Mapping, errors: &mut ErrorSet) {
    let Some(services) = get(doc, "services") else {
        errors.push(schema_err("services", "a services mapping is required"));
        return;
    };
    let Some(services) = services.as_mapping() else {
        errors.push(schema_err("services", "must be a mapping"));
        return;
    };

    for (key, body) in services {
        let Some(name) = scalar_to_string(key) else {
            errors.push(schema_err("services", "service names must be strings"));
            continue;
        };
        let path = format!("services.{name}");
        match body.as_mapping() {
            Some(service) => {
                if let Err(err) = validate_service(&path, service) {
                    errors.push(err);
                }
            }
            None => errors.push(schema_err(&path, "service definition must be a mapping")),
        }
    }
}

/// First-error-wins check of one service definition.
fn validate_service(path: &str, service: &Mapping) -> Result<()> {
    for key in service.keys() {
        let name = scalar_to_string(key)
            .ok_or_else(|| schema_err(path, "service keys must be strings"))?;
        if !SERVICE_KEYS.contains(&name.as_str()) {
            return Err(schema_err(
                &format!("{path}.{name}"),
                "unrecognized service key",
            ));
        }
    }

    check_shape(path, service, "image", expect_scalar)?;
    check_shape(path, service, "command", expect_scalar_or_list)?;
    check_shape(path, service, "entrypoint", expect_scalar_or_list)?;
    check_shape(path, service, "environment", expect_keyed_values)?;
    check_shape(path, service, "labels", expect_keyed_values)?;
    check_shape(path, service, "env_file", expect_scalar_or_list)?;
    check_shape(path, service, "label_file", expect_scalar_or_list)?;
    check_shape(path, service, "links", expect_scalar_list)?;
    check_shape(path, service, "external_links", expect_scalar_list)?;
    check_shape(path, service, "volumes_from", expect_scalar_list)?;
    check_shape(path, service, "expose", expect_scalar_list)?;
    for key in [
        "user",
        "working_dir",
        "hostname",
        "container_name",
        "stop_grace_period",
        "network_mode",
        "restart",
    ] {
        check_shape(path, service, key, expect_scalar)?;
    }

    if let Some(value) = get(service, "build") {
        validate_build(&format!("{path}.build"), value)?;
    }
    if let Some(value) = get(service, "extends") {
        validate_extends(&format!("{path}.extends"), value)?;
    }
    if let Some(value) = get(service, "depends_on") {
        validate_depends_on(&format!("{path}.depends_on"), value)?;
    }
    if let Some(value) = get(service, "ports") {
        validate_entry_list(&format!("{path}.ports"), value, PORT_KEYS)?;
    }
    if let Some(value) = get(service, "volumes") {
        validate_entry_list(&format!("{path}.volumes"), value, MOUNT_KEYS)?;
    }
    if let Some(value) = get(service, "networks") {
        validate_networks_attachment(&format!("{path}.networks"), value)?;
    }
    for key in ["configs", "secrets"] {
        if let Some(value) = get(service, key) {
            validate_grants(&format!("{path}.{key}"), value)?;
        }
    }
    if let Some(value) = get(service, "deploy") {
        validate_deploy(&format!("{path}.deploy"), value)?;
    }
    if let Some(value) = get(service, "healthcheck") {
        validate_healthcheck(&format!("{path}.healthcheck"), value)?;
    }

    if let Some(value) = get(service, "restart") {
        let text = scalar_to_string(value).unwrap_or_default();
        if RestartPolicy::parse(&text).is_none() {
            return Err(schema_err(
                &format!("{path}.restart"),
                "expected one of: no, always, on-failure, unless-stopped",
            ));
        }
    }
    if let Some(value) = get(service, "network_mode") {
        validate_network_mode(&format!("{path}.network_mode"), value)?;
    }

    check_networking_conflicts(path, service)?;
    check_target_conflict(path, service)?;
    Ok(())
}

/// `network_mode` other than the default bridge excludes published ports
/// and named network attachments.
///
/// Shared with the emitter, which re-checks after `extends` merging may
/// have introduced either side of the conflict.
pub(crate) fn check_networking_conflicts(path: &str, service: &Mapping) -> Result<()> {
    let Some(mode) = get(service, "network_mode").and_then(scalar_to_string) else {
        return Ok(());
    };
    if mode == "bridge" {
        return Ok(());
    }
    if get(service, "ports").is_some_and(|v| !is_empty_value(v)) {
        return Err(ComposeError::Conflict {
            path: path.to_string(),
            reason: format!("network_mode \"{mode}\" cannot be combined with ports"),
        });
    }
    if get(service, "networks").is_some_and(|v| !is_empty_value(v)) {
        return Err(ComposeError::Conflict {
            path: path.to_string(),
            reason: format!("network_mode \"{mode}\" cannot be combined with networks"),
        });
    }
    Ok(())
}

/// `build` and `image` are mutually exclusive; exactly one must name the
/// deployable target.
pub(crate) fn check_target_conflict(path: &str, service: &Mapping) -> Result<()> {
    if get(service, "build").is_some() && get(service, "image").is_some() {
        return Err(ComposeError::Conflict {
            path: path.to_string(),
            reason: "build and image are mutually exclusive; declare exactly one".into(),
        });
    }
    Ok(())
}

fn validate_network_mode(path: &str, value: &Value) -> Result<()> {
    let mode = scalar_to_string(value).ok_or_else(|| schema_err(path, "expected a string"))?;
    let valid = matches!(mode.as_str(), "host" | "none" | "bridge")
        || mode
            .strip_prefix("service:")
            .or_else(|| mode.strip_prefix("container:"))
            .is_some_and(|rest| !rest.is_empty());
    if valid {
        Ok(())
    } else {
        Err(schema_err(
            path,
            "expected host, none, bridge, service:<name>, or container:<name>",
        ))
    }
}

fn validate_build(path: &str, value: &Value) -> Result<()> {
    if scalar_to_string(value).is_some() {
        return Ok(());
    }
    let map = value
        .as_mapping()
        .ok_or_else(|| schema_err(path, "expected a string or a mapping"))?;
    check_known_keys(path, map, BUILD_KEYS)?;
    if let Some(args) = get(map, "args") {
        expect_keyed_values(&format!("{path}.args"), args)?;
    }
    Ok(())
}

fn validate_extends(path: &str, value: &Value) -> Result<()> {
    // Short form names a service in the same file.
    if scalar_to_string(value).is_some() {
        return Ok(());
    }
    let map = value
        .as_mapping()
        .ok_or_else(|| schema_err(path, "expected a string or a mapping"))?;
    check_known_keys(path, map, EXTENDS_KEYS)?;
    let _ = get(map, "service")
        .and_then(scalar_to_string)
        .ok_or_else(|| schema_err(path, "a service key is required"))?;
    Ok(())
}

fn validate_depends_on(path: &str, value: &Value) -> Result<()> {
    match value {
        Value::Sequence(items) => {
            for (idx, item) in items.iter().enumerate() {
                if scalar_to_string(item).is_none() {
                    return Err(schema_err(
                        &format!("{path}.{idx}"),
                        "expected a service name",
                    ));
                }
            }
            Ok(())
        }
        Value::Mapping(entries) => {
            for (key, body) in entries {
                let name = scalar_to_string(key)
                    .ok_or_else(|| schema_err(path, "dependency names must be strings"))?;
                let entry_path = format!("{path}.{name}");
                match body {
                    Value::Null => {}
                    Value::Mapping(map) => check_known_keys(&entry_path, map, DEPENDENCY_KEYS)?,
                    _ => return Err(schema_err(&entry_path, "expected a mapping")),
                }
            }
            Ok(())
        }
        _ => Err(schema_err(path, "expected a list or a mapping")),
    }
}

/// A list whose entries are either short-form scalars or long-form
/// mappings restricted to `known` keys.
fn validate_entry_list(path: &str, value: &Value, known: &[&str]) -> Result<()> {
    let items = value
        .as_sequence()
        .ok_or_else(|| schema_err(path, "expected a list"))?;
    for (idx, item) in items.iter().enumerate() {
        let entry_path = format!("{path}.{idx}");
        match item {
            Value::Mapping(map) => check_known_keys(&entry_path, map, known)?,
            _ if scalar_to_string(item).is_some() => {}
            _ => return Err(schema_err(&entry_path, "expected a scalar or a mapping")),
        }
    }
    Ok(())
}

fn validate_networks_attachment(path: &str, value: &Value) -> Result<()> {
    match value {
        Value::Sequence(items) => {
            for (idx, item) in items.iter().enumerate() {
                if scalar_to_string(item).is_none() {
                    return Err(schema_err(
                        &format!("{path}.{idx}"),
                        "expected a network name",
                    ));
                }
            }
            Ok(())
        }
        Value::Mapping(entries) => {
            for (key, body) in entries {
                let name = scalar_to_string(key)
                    .ok_or_else(|| schema_err(path, "network names must be strings"))?;
                let entry_path = format!("{path}.{name}");
                match body {
                    Value::Null => {}
                    Value::Mapping(map) => check_known_keys(&entry_path, map, ATTACHMENT_KEYS)?,
                    _ => return Err(schema_err(&entry_path, "expected a mapping")),
                }
            }
            Ok(())
        }
        _ => Err(schema_err(path, "expected a list or a mapping")),
    }
}

fn validate_grants(path: &str, value: &Value) -> Result<()> {
    let items = value
        .as_sequence()
        .ok_or_else(|| schema_err(path, "expected a list"))?;
    for (idx, item) in items.iter().enumerate() {
        let entry_path = format!("{path}.{idx}");
        match item {
            Value::Mapping(map) => {
                check_known_keys(&entry_path, map, GRANT_KEYS)?;
                let _ = get(map, "source")
                    .and_then(scalar_to_string)
                    .ok_or_else(|| schema_err(&entry_path, "a source key is required"))?;
            }
            _ if scalar_to_string(item).is_some() => {}
            _ => return Err(schema_err(&entry_path, "expected a name or a mapping")),
        }
    }
    Ok(())
}

fn validate_deploy(path: &str, value: &Value) -> Result<()> {
    let map = value
        .as_mapping()
        .ok_or_else(|| schema_err(path, "expected a mapping"))?;
    check_known_keys(path, map, DEPLOY_KEYS)?;
    if let Some(resources) = get(map, "resources") {
        let resources_path = format!("{path}.resources");
        let resources = resources
            .as_mapping()
            .ok_or_else(|| schema_err(&resources_path, "expected a mapping"))?;
        check_known_keys(&resources_path, resources, RESOURCES_KEYS)?;
        for section in RESOURCES_KEYS {
            if let Some(limits) = get(resources, section) {
                let limits_path = format!("{resources_path}.{section}");
                let limits = limits
                    .as_mapping()
                    .ok_or_else(|| schema_err(&limits_path, "expected a mapping"))?;
                check_known_keys(&limits_path, limits, LIMIT_KEYS)?;
            }
        }
    }
    Ok(())
}

fn validate_healthcheck(path: &str, value: &Value) -> Result<()> {
    let map = value
        .as_mapping()
        .ok_or_else(|| schema_err(path, "expected a mapping"))?;
    check_known_keys(path, map, HEALTHCHECK_KEYS)?;
    if let Some(test) = get(map, "test") {
        expect_scalar_or_list(&format!("{path}.test"), test)?;
    }
    Ok(())
}

fn validate_section(doc: &Mapping, section: &str, known: &[&str], errors: &mut ErrorSet) {
    let Some(value) = get(doc, section) else {
        return;
    };
    let Some(entries) = value.as_mapping() else {
        errors.push(schema_err(section, "must be a mapping"));
        return;
    };
    for (key, body) in entries {
        let Some(name) = scalar_to_string(key) else {
            errors.push(schema_err(section, "declaration names must be strings"));
            continue;
        };
        let path = format!("{section}.{name}");
        match body {
            Value::Null => {}
            Value::Mapping(map) => {
                if let Err(err) = check_known_keys(&path, map, known) {
                    errors.push(err);
                }
            }
            _ => errors.push(schema_err(&path, "expected a mapping or null")),
        }
    }
}

/// Configs and secrets must name exactly one source: an inline file or an
/// externally provisioned object.
fn validate_file_objects(doc: &Mapping, section: &str, errors: &mut ErrorSet) {
    let Some(value) = get(doc, section) else {
        return;
    };
    let Some(entries) = value.as_mapping() else {
        errors.push(schema_err(section, "must be a mapping"));
        return;
    };
    for (key, body) in entries {
        let Some(name) = scalar_to_string(key) else {
            errors.push(schema_err(section, "declaration names must be strings"));
            continue;
        };
        let path = format!("{section}.{name}");
        let Some(map) = body.as_mapping() else {
            errors.push(schema_err(&path, "expected a mapping"));
            continue;
        };
        if let Err(err) = check_known_keys(&path, map, FILE_OBJECT_KEYS) {
            errors.push(err);
            continue;
        }
        let has_file = get(map, "file").is_some();
        let external = get(map, "external")
            .and_then(crate::loader::scalar_to_bool)
            .unwrap_or(false);
        if has_file && external {
            errors.push(ComposeError::Conflict {
                path,
                reason: "file and external are mutually exclusive".into(),
            });
        } else if !has_file && !external {
            errors.push(schema_err(&path, "either file or external is required"));
        }
    }
}

fn check_known_keys(path: &str, map: &Mapping, known: &[&str]) -> Result<()> {
    for key in map.keys() {
        let name =
            scalar_to_string(key).ok_or_else(|| schema_err(path, "keys must be strings"))?;
        if !known.contains(&name.as_str()) {
            return Err(schema_err(&format!("{path}.{name}"), "unrecognized key"));
        }
    }
    Ok(())
}

fn check_shape(
    path: &str,
    service: &Mapping,
    key: &str,
    check: fn(&str, &Value) -> Result<()>,
) -> Result<()> {
    match get(service, key) {
        Some(value) => check(&format!("{path}.{key}"), value),
        None => Ok(()),
    }
}

fn expect_scalar(path: &str, value: &Value) -> Result<()> {
    scalar_to_string(value)
        .map(|_| ())
        .ok_or_else(|| schema_err(path, "expected a scalar"))
}

fn expect_scalar_list(path: &str, value: &Value) -> Result<()> {
    let items = value
        .as_sequence()
        .ok_or_else(|| schema_err(path, "expected a list"))?;
    for (idx, item) in items.iter().enumerate() {
        if scalar_to_string(item).is_none() {
            return Err(schema_err(&format!("{path}.{idx}"), "expected a scalar"));
        }
    }
    Ok(())
}

fn expect_scalar_or_list(path: &str, value: &Value) -> Result<()> {
    if scalar_to_string(value).is_some() {
        Ok(())
    } else {
        expect_scalar_list(path, value)
    }
}

/// `environment`-style values: a mapping of scalars, or a list of
/// `KEY=value` strings.
fn expect_keyed_values(path: &str, value: &Value) -> Result<()> {
    match value {
        Value::Mapping(map) => {
            for (key, item) in map {
                if scalar_to_string(key).is_none() {
                    return Err(schema_err(path, "keys must be strings"));
                }
                if !item.is_null() && scalar_to_string(item).is_none() {
                    let label = scalar_to_string(key).unwrap_or_default();
                    return Err(schema_err(
                        &format!("{path}.{label}"),
                        "expected a scalar value",
                    ));
                }
            }
            Ok(())
        }
        Value::Sequence(_) => expect_scalar_list(path, value),
        _ => Err(schema_err(path, "expected a mapping or a list")),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Sequence(items) => items.is_empty(),
        Value::Mapping(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn schema_err(path: &str, reason: &str) -> ComposeError {
    ComposeError::Schema {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
