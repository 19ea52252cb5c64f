//! Options controlling document resolution.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Policy applied when `${VAR}` names a variable that is not set
/// and carries no default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UndefinedVarPolicy {
    /// Substitute the empty string.
    #[default]
    Empty,
    /// Fail resolution with an interpolation error.
    Error,
}

/// Options for one resolution run.
///
/// The variable environment is captured once when the options are built;
/// resolution itself never consults the process environment, which keeps
/// the pipeline deterministic and testable.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Directory against which relative include paths
    /// (`extends.file`, `env_file`, `configs[].file`) are resolved.
    pub working_dir: PathBuf,
    /// Variables available to `${VAR}` interpolation.
    pub variables: BTreeMap<String, String>,
    /// Behavior for undefined variables without a default.
    pub undefined_vars: UndefinedVarPolicy,
}

impl ResolveOptions {
    /// Builds options rooted at `working_dir` with an explicit
    /// variable set.
    #[must_use]
    pub const fn new(working_dir: PathBuf, variables: BTreeMap<String, String>) -> Self {
        Self {
            working_dir,
            variables,
            undefined_vars: UndefinedVarPolicy::Empty,
        }
    }

    /// Builds options rooted at `working_dir`, capturing the current
    /// process environment as the variable set.
    #[must_use]
    pub fn from_env(working_dir: PathBuf) -> Self {
        Self::new(working_dir, std::env::vars().collect())
    }

    /// Switches the undefined-variable policy.
    #[must_use]
    pub const fn with_undefined_vars(mut self, policy: UndefinedVarPolicy) -> Self {
        self.undefined_vars = policy;
        self
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_env(cwd)
    }
}
