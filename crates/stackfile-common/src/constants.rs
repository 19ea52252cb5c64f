//! System-wide constants.

/// File names probed, in order, when no document path is given.
pub const DEFAULT_FILE_NAMES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Project name used when the document declares none and no directory
/// name is usable.
pub const DEFAULT_PROJECT_NAME: &str = "default";

/// Hard ceiling on `extends` chain depth. The visited set catches cycles;
/// this bounds pathological non-cyclic chains.
pub const MAX_EXTENDS_DEPTH: usize = 64;

/// Default permission mode for mounted configs.
pub const DEFAULT_CONFIG_MODE: u32 = 0o444;

/// Default permission mode for mounted secrets.
pub const DEFAULT_SECRET_MODE: u32 = 0o400;

/// Application name used in CLI output.
pub const APP_NAME: &str = "stackfile";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "sfl";
