//! Domain primitive types shared across the stackfile workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Restart policy of a service, as understood by the external runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart.
    #[default]
    No,
    /// Always restart, including after daemon restarts.
    Always,
    /// Restart only when the container exits non-zero.
    OnFailure,
    /// Restart unless explicitly stopped.
    UnlessStopped,
}

impl RestartPolicy {
    /// Parses the textual policy used in service definitions.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "no" => Some(Self::No),
            "always" => Some(Self::Always),
            "on-failure" => Some(Self::OnFailure),
            "unless-stopped" => Some(Self::UnlessStopped),
            _ => None,
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::Always => write!(f, "always"),
            Self::OnFailure => write!(f, "on-failure"),
            Self::UnlessStopped => write!(f, "unless-stopped"),
        }
    }
}

/// Condition attached to a dependency edge between two services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    /// The dependency has started.
    #[default]
    ServiceStarted,
    /// The dependency reports healthy.
    ServiceHealthy,
    /// The dependency ran to completion with exit code zero.
    ServiceCompletedSuccessfully,
}

impl DependencyCondition {
    /// Parses the textual condition used in long-form `depends_on`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "service_started" => Some(Self::ServiceStarted),
            "service_healthy" => Some(Self::ServiceHealthy),
            "service_completed_successfully" => Some(Self::ServiceCompletedSuccessfully),
            _ => None,
        }
    }
}

impl fmt::Display for DependencyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceStarted => write!(f, "service_started"),
            Self::ServiceHealthy => write!(f, "service_healthy"),
            Self::ServiceCompletedSuccessfully => write!(f, "service_completed_successfully"),
        }
    }
}

/// Resource limits requested for a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Fraction of CPU time (e.g. `0.5` for half a core).
    pub cpus: Option<f64>,
    /// Memory limit in bytes.
    pub memory_bytes: Option<u64>,
    /// Maximum number of processes.
    pub pids: Option<u64>,
}

impl ResourceLimits {
    /// Returns `true` when no limit is set.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.cpus.is_none() && self.memory_bytes.is_none() && self.pids.is_none()
    }
}

/// Parses a byte-size string such as `256M`, `1gb`, or `512MiB`.
///
/// A bare number is taken as bytes. Suffixes are case-insensitive;
/// `k`/`kb`/`kib` all denote 1024, matching the external runtime.
#[must_use]
pub fn parse_byte_size(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(digits_end);
    let number: u64 = digits.parse().ok()?;

    let multiplier: u64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        "g" | "gb" | "gib" => 1024 * 1024 * 1024,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

/// Ownership and permission bits for a config or secret mounted
/// into a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOwnership {
    /// Owning user id, as the runtime expects it.
    pub uid: Option<String>,
    /// Owning group id.
    pub gid: Option<String>,
    /// Permission mode (e.g. `0o440`).
    pub mode: Option<u32>,
}
