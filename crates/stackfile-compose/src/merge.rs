//! `extends` inheritance and override semantics.
//!
//! The extending service's own fields override same-named fields from the
//! extended fragment. List-valued fields concatenate with the child's
//! entries taking precedence on key collision (`KEY=value` environment
//! entries are keyed by variable name), and mapping-valued fields
//! deep-merge key by key with the child winning ties.

use serde_yaml::{Mapping, Value};

use crate::loader::scalar_to_string;

/// Fields keyed by an embedded name (`KEY=value`), merged entry-wise.
const KEYED_FIELDS: &[&str] = &["environment", "labels"];

/// Fields that are plain lists, concatenated parent-first.
const CONCAT_FIELDS: &[&str] = &[
    "ports",
    "expose",
    "volumes",
    "volumes_from",
    "links",
    "external_links",
    "env_file",
    "label_file",
    "configs",
    "secrets",
];

/// Fields that accept both a list and a mapping form; normalized to the
/// mapping form before merging.
const NAMED_SET_FIELDS: &[&str] = &["depends_on", "networks"];

/// Merges an extended fragment into the service that extends it.
///
/// `parent` is the fully resolved fragment (its own `extends` already
/// applied); `child` is the extending service without its `extends` key.
#[must_use]
pub fn merge_service(parent: &Mapping, child: &Mapping) -> Mapping {
    let mut result = parent.clone();

    for (key, child_value) in child {
        let Some(name) = scalar_to_string(key) else {
            let _ = result.insert(key.clone(), child_value.clone());
            continue;
        };
        let merged = match result.get(key) {
            Some(parent_value) => merge_field(&name, parent_value, child_value),
            None => child_value.clone(),
        };
        let _ = result.insert(key.clone(), merged);
    }

    result
}

fn merge_field(name: &str, parent: &Value, child: &Value) -> Value {
    if KEYED_FIELDS.contains(&name) {
        return Value::Mapping(merge_keyed(parent, child));
    }
    if NAMED_SET_FIELDS.contains(&name) {
        let merged = deep_merge(&normalize_named_set(parent), &normalize_named_set(child));
        return Value::Mapping(merged);
    }
    if CONCAT_FIELDS.contains(&name) {
        return concat_lists(parent, child);
    }
    match (parent, child) {
        (Value::Mapping(p), Value::Mapping(c)) => Value::Mapping(deep_merge(p, c)),
        _ => child.clone(),
    }
}

/// Recursive mapping merge; the child wins ties on non-mapping values.
#[must_use]
pub fn deep_merge(parent: &Mapping, child: &Mapping) -> Mapping {
    let mut result = parent.clone();
    for (key, child_value) in child {
        let merged = match (result.get(key), child_value) {
            (Some(Value::Mapping(p)), Value::Mapping(c)) => Value::Mapping(deep_merge(p, c)),
            _ => child_value.clone(),
        };
        let _ = result.insert(key.clone(), merged);
    }
    result
}

/// Splits an `environment`/`labels` value into `(key, value)` entries.
/// The mapping form yields its entries directly; the list form splits
/// `KEY=value` strings, with a bare `KEY` yielding a null value.
#[must_use]
pub fn keyed_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Mapping(map) => map
            .iter()
            .filter_map(|(k, v)| scalar_to_string(k).map(|name| (name, v.clone())))
            .collect(),
        Value::Sequence(items) => items
            .iter()
            .filter_map(|item| {
                let text = scalar_to_string(item)?;
                Some(match text.split_once('=') {
                    Some((key, val)) => (key.to_string(), Value::String(val.to_string())),
                    None => (text, Value::Null),
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn merge_keyed(parent: &Value, child: &Value) -> Mapping {
    let mut result = Mapping::new();
    for (key, value) in keyed_entries(parent).into_iter().chain(keyed_entries(child)) {
        let _ = result.insert(Value::String(key), value);
    }
    result
}

/// `depends_on`/`networks` normalize to their mapping form: a bare name
/// list becomes names with null bodies.
fn normalize_named_set(value: &Value) -> Mapping {
    match value {
        Value::Mapping(map) => map.clone(),
        Value::Sequence(items) => {
            let mut map = Mapping::new();
            for item in items {
                if let Some(name) = scalar_to_string(item) {
                    let _ = map.insert(Value::String(name), Value::Null);
                }
            }
            map
        }
        _ => Mapping::new(),
    }
}

fn concat_lists(parent: &Value, child: &Value) -> Value {
    let mut items: Vec<Value> = parent.as_sequence().cloned().unwrap_or_default();
    for entry in child.as_sequence().cloned().unwrap_or_default() {
        if !items.contains(&entry) {
            items.push(entry);
        }
    }
    Value::Sequence(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(text: &str) -> Mapping {
        serde_yaml::from_str(text).expect("fixture should parse")
    }

    #[test]
    fn child_scalar_overrides_parent() {
        let parent = map("image: base:1\nrestart: always\n");
        let child = map("restart: unless-stopped\n");
        let merged = merge_service(&parent, &child);
        assert_eq!(
            merged.get("restart").and_then(Value::as_str),
            Some("unless-stopped")
        );
        assert_eq!(merged.get("image").and_then(Value::as_str), Some("base:1"));
    }

    #[test]
    fn environment_merges_by_variable_name() {
        let parent = map("environment:\n  LOG_LEVEL: warn\n  DB_HOST: db\n");
        let child = map("environment:\n- LOG_LEVEL=debug\n- EXTRA=1\n");
        let merged = merge_service(&parent, &child);
        let env = merged
            .get("environment")
            .and_then(Value::as_mapping)
            .expect("environment mapping");
        assert_eq!(
            env.get(Value::String("LOG_LEVEL".into()))
                .and_then(Value::as_str),
            Some("debug")
        );
        assert_eq!(
            env.get(Value::String("DB_HOST".into()))
                .and_then(Value::as_str),
            Some("db")
        );
        assert_eq!(
            env.get(Value::String("EXTRA".into()))
                .and_then(Value::as_str),
            Some("1")
        );
    }

    #[test]
    fn lists_concatenate_without_duplicates() {
        let parent = map("ports:\n- 8080:80\n- 8443:443\n");
        let child = map("ports:\n- 8080:80\n- 9000:9000\n");
        let merged = merge_service(&parent, &child);
        let ports = merged
            .get("ports")
            .and_then(Value::as_sequence)
            .expect("ports");
        assert_eq!(ports.len(), 3);
    }

    #[test]
    fn depends_on_list_and_mapping_forms_merge() {
        let parent = map("depends_on:\n- db\n");
        let child = map("depends_on:\n  cache:\n    condition: service_healthy\n");
        let merged = merge_service(&parent, &child);
        let deps = merged
            .get("depends_on")
            .and_then(Value::as_mapping)
            .expect("depends_on mapping");
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn mappings_deep_merge_with_child_winning() {
        let parent = map("build:\n  context: .\n  args:\n    A: 1\n    B: 2\n");
        let child = map("build:\n  args:\n    B: 3\n");
        let merged = merge_service(&parent, &child);
        let args = merged
            .get("build")
            .and_then(Value::as_mapping)
            .and_then(|b| b.get(Value::String("args".into())))
            .and_then(Value::as_mapping)
            .expect("args");
        assert_eq!(args.len(), 2);
        assert_eq!(
            crate::loader::get(args, "B").and_then(crate::loader::scalar_to_string),
            Some("3".into())
        );
    }

    #[test]
    fn keyed_entries_splits_list_form() {
        let value: Value = serde_yaml::from_str("- FOO=bar\n- BAZ\n").expect("parse");
        let entries = keyed_entries(&value);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "FOO");
        assert_eq!(entries[0].1.as_str(), Some("bar"));
        assert!(entries[1].1.is_null());
    }

    #[test]
    fn fields_only_in_child_are_kept() {
        let parent = map("image: base\n");
        let child = map("command: [echo, hi]\n");
        let merged = merge_service(&parent, &child);
        assert!(merged.get("command").is_some());
        assert!(merged.get("image").is_some());
    }
}
