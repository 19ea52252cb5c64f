//! Document loading into a generic tree.
//!
//! The loader is the only stage that touches raw text. It produces a
//! [`serde_yaml::Value`] tree that preserves sequence order and mapping
//! insertion order losslessly, so an unmodified document re-serializes
//! without data loss.
//!
//! Duplicate mapping keys (two declarations with the same name) are
//! rejected by the underlying parser; the loader surfaces them as schema
//! errors rather than syntax errors, since the text itself is well-formed.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use stackfile_common::constants::DEFAULT_FILE_NAMES;
use stackfile_common::error::{ComposeError, Result};

/// Loads a document from text into the generic tree.
///
/// # Errors
///
/// Returns [`ComposeError::Syntax`] for malformed input and
/// [`ComposeError::Schema`] for duplicate mapping keys.
pub fn load_str(text: &str) -> Result<Value> {
    serde_yaml::from_str(text).map_err(|err| classify_parse_error(&err))
}

/// Loads a document from a file into the generic tree.
///
/// # Errors
///
/// Returns [`ComposeError::MissingFile`] when the file does not exist,
/// [`ComposeError::Io`] for other read failures, and the [`load_str`]
/// errors for bad content.
pub fn load_file(path: &Path) -> Result<Value> {
    tracing::debug!(path = %path.display(), "loading included file");
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ComposeError::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            ComposeError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    load_str(&text)
}

/// Probes `dir` for the default document file names, in order.
///
/// # Errors
///
/// Returns [`ComposeError::MissingFile`] naming the first candidate when
/// none of the default files exist.
pub fn locate_default(dir: &Path) -> Result<PathBuf> {
    for name in DEFAULT_FILE_NAMES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(ComposeError::MissingFile {
        path: dir.join(DEFAULT_FILE_NAMES[0]),
    })
}

/// The parser reports duplicate mapping keys as a deserialization error;
/// everything else is a genuine syntax problem.
fn classify_parse_error(err: &serde_yaml::Error) -> ComposeError {
    let message = err.to_string();
    if message.contains("duplicate entry") {
        ComposeError::Schema {
            path: err
                .location()
                .map(|loc| format!("line {}, column {}", loc.line(), loc.column()))
                .unwrap_or_default(),
            reason: "duplicate declaration name".into(),
        }
    } else {
        ComposeError::Syntax { message }
    }
}

/// Looks up a string key in a mapping.
#[must_use]
pub fn get<'a>(map: &'a serde_yaml::Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_string()))
}

/// Renders a scalar node as a string. Strings pass through; numbers and
/// booleans are stringified the way they were written. Non-scalars and
/// nulls yield `None`.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reads a boolean-ish scalar: `true`/`false` or their string forms.
#[must_use]
pub fn scalar_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
