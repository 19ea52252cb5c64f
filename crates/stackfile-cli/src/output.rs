//! Rendering of the normalized model for CLI output.

use clap::ValueEnum;
use stackfile_compose::model::Project;

/// Serialization format for `sfl config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Canonical YAML.
    Yaml,
    /// Pretty-printed JSON.
    Json,
}

/// Renders the resolved project in the requested format.
///
/// # Errors
///
/// Returns an error when serialization fails.
pub fn render_project(project: &Project, format: Format) -> anyhow::Result<String> {
    match format {
        Format::Yaml => Ok(serde_yaml::to_string(project)?),
        Format::Json => {
            let mut rendered = serde_json::to_string_pretty(project)?;
            rendered.push('\n');
            Ok(rendered)
        }
    }
}
