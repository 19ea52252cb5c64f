//! # stackfile-compose
//!
//! Parser and resolver for compose documents.
//!
//! The pipeline runs strictly left to right; each stage depends only on
//! the output of the previous one:
//! - **Loader**: raw text into a generic tree of mappings/sequences/scalars.
//! - **Interpolate**: `${VAR}` substitution against a captured environment.
//! - **Schema**: recognized-key and value-shape checks per context.
//! - **Resolver**: cross-reference checks, `extends`/`env_file` inclusion.
//! - **Merge**: `extends` inheritance with child-wins semantics.
//! - **Emit**: the immutable, fully resolved [`model::Project`].
//! - **Graph**: `depends_on` startup ordering.

pub mod emit;
pub mod graph;
pub mod interpolate;
pub mod loader;
pub mod merge;
pub mod model;
pub mod resolver;
pub mod schema;

use std::path::Path;

use stackfile_common::error::{ComposeError, ErrorSet};
use stackfile_common::options::ResolveOptions;

use crate::model::Project;

/// Resolves a compose document from a file into the normalized model.
///
/// Either a fully resolved [`Project`] is produced, or an error set; never
/// a partial result.
///
/// # Errors
///
/// Returns every independent validation or resolution failure collected
/// across the document.
pub fn resolve_file(path: &Path, opts: &ResolveOptions) -> Result<Project, ErrorSet> {
    tracing::info!(path = %path.display(), "resolving compose file");
    let text = std::fs::read_to_string(path).map_err(|source| {
        ErrorSet::from(if source.kind() == std::io::ErrorKind::NotFound {
            ComposeError::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            ComposeError::Io {
                path: path.to_path_buf(),
                source,
            }
        })
    })?;
    resolve_str(&text, path, opts)
}

/// Resolves a compose document from text. `origin` is the logical path of
/// the document, used for relative includes and `extends` cycle chains.
///
/// # Errors
///
/// Returns every independent validation or resolution failure collected
/// across the document.
pub fn resolve_str(text: &str, origin: &Path, opts: &ResolveOptions) -> Result<Project, ErrorSet> {
    let mut root = loader::load_str(text).map_err(ErrorSet::from)?;
    interpolate::apply(&mut root, opts)?;

    let Some(doc) = root.as_mapping().cloned() else {
        return Err(ErrorSet::from(ComposeError::Schema {
            path: String::new(),
            reason: "top level of the document must be a mapping".into(),
        }));
    };

    schema::validate(&doc)?;

    let registry = resolver::Registry::from_document(&doc);
    let mut resolver = resolver::Resolver::new(opts, &registry);
    let services = resolver.resolve_services(&doc, origin)?;

    emit::emit_project(&doc, &services, &registry, origin, opts)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;

    fn opts() -> ResolveOptions {
        ResolveOptions::new(PathBuf::from("."), BTreeMap::new())
    }

    #[test]
    fn resolve_minimal_document() {
        let text = "services:\n  web:\n    image: nginx:1.27\n";
        let project =
            resolve_str(text, Path::new("compose.yaml"), &opts()).expect("should resolve");
        assert_eq!(project.services.len(), 1);
        assert_eq!(project.services[0].name, "web");
    }

    #[test]
    fn resolve_rejects_scalar_top_level() {
        let err = resolve_str("42", Path::new("compose.yaml"), &opts()).unwrap_err();
        assert!(err.to_string().contains("must be a mapping"));
    }

    #[test]
    fn resolve_missing_file_reports_path() {
        let err = resolve_file(Path::new("/nonexistent/compose.yaml"), &opts()).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/compose.yaml"));
    }
}
