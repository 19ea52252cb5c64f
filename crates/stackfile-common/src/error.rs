//! Unified error types for the stackfile workspace.
//!
//! Every error carries the document path of the offending node
//! (e.g. `services.web.ports`) so callers can report failures without
//! re-walking the tree.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The document text is not well-formed.
    #[error("syntax error: {message}")]
    Syntax {
        /// Description of the malformed construct.
        message: String,
    },

    /// A node violates the recognized-key or value-shape rules
    /// for its context.
    #[error("schema error at {path}: {reason}")]
    Schema {
        /// Document path of the offending node.
        path: String,
        /// Why the node was rejected.
        reason: String,
    },

    /// Two mutually exclusive fields are both set.
    #[error("conflict at {path}: {reason}")]
    Conflict {
        /// Document path of the offending node.
        path: String,
        /// Which fields conflict and why.
        reason: String,
    },

    /// A symbolic reference names an entity that is not declared.
    #[error("{kind} \"{name}\" referenced from {referenced_from} is not declared")]
    UnresolvedReference {
        /// Category of the missing entity.
        kind: &'static str,
        /// The dangling name.
        name: String,
        /// Document path of the reference.
        referenced_from: String,
    },

    /// An included file does not exist.
    #[error("file not found: {path}")]
    MissingFile {
        /// The path that could not be read.
        path: PathBuf,
    },

    /// An `extends` chain revisits a service it already passed through.
    #[error("cyclic extends chain: {chain}")]
    CyclicExtends {
        /// The full chain, rendered as `file#service -> file#service`.
        chain: String,
    },

    /// The `depends_on` graph contains a cycle.
    #[error("cyclic service dependency: {chain}")]
    DependencyCycle {
        /// Services participating in the cycle.
        chain: String,
    },

    /// Variable substitution failed.
    #[error("interpolation error at {path}: {message}")]
    Interpolation {
        /// Document path of the scalar being substituted.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T, E = ComposeError> = std::result::Result<T, E>;

/// A collection of independent resolution failures.
///
/// Resolution halts at the first fatal error per service, but independent
/// services are each validated and their errors gathered here, so one
/// invocation can report several failures at once. Never empty when
/// returned as the `Err` of a pipeline stage.
#[derive(Debug, Default)]
pub struct ErrorSet {
    errors: Vec<ComposeError>,
}

impl ErrorSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Appends one error.
    pub fn push(&mut self, error: ComposeError) {
        self.errors.push(error);
    }

    /// Absorbs all errors from another set.
    pub fn extend(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    /// Returns `true` if no error has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// The recorded errors, in the order they were encountered.
    #[must_use]
    pub fn errors(&self) -> &[ComposeError] {
        &self.errors
    }

    /// Converts the set into `Err(self)` when non-empty, `Ok(value)`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the set itself when at least one error was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl From<ComposeError> for ErrorSet {
    fn from(error: ComposeError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl IntoIterator for ErrorSet {
    type Item = ComposeError;
    type IntoIter = std::vec::IntoIter<ComposeError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.errors.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorSet {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_set_starts_empty() {
        let set = ErrorSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn into_result_ok_when_empty() {
        let set = ErrorSet::new();
        let value = set.into_result(42).expect("empty set should be Ok");
        assert_eq!(value, 42);
    }

    #[test]
    fn into_result_err_when_populated() {
        let mut set = ErrorSet::new();
        set.push(ComposeError::Syntax {
            message: "bad indent".into(),
        });
        let err = set.into_result(()).unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn display_joins_errors_with_newlines() {
        let mut set = ErrorSet::new();
        set.push(ComposeError::MissingFile {
            path: PathBuf::from("a.env"),
        });
        set.push(ComposeError::MissingFile {
            path: PathBuf::from("b.env"),
        });
        let rendered = set.to_string();
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.contains("a.env"));
        assert!(rendered.contains("b.env"));
    }

    #[test]
    fn unresolved_reference_names_the_entity() {
        let err = ComposeError::UnresolvedReference {
            kind: "service",
            name: "ghost".into(),
            referenced_from: "services.web.depends_on".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ghost"), "got: {msg}");
        assert!(msg.contains("services.web.depends_on"), "got: {msg}");
    }
}
