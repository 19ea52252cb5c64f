//! The normalized project model.
//!
//! Everything here is fully merged and fully resolved: symbolic names
//! have been replaced by typed handles into the owning [`Project`], and
//! no further mutation happens after emission. This is the contract
//! object handed to the external container runtime; it performs no
//! actions of its own.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use stackfile_common::error::Result;
use stackfile_common::types::{
    DependencyCondition, FileOwnership, ResourceLimits, RestartPolicy,
};

/// Handle to a [`Service`] within its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ServiceId(pub(crate) usize);

/// Handle to a [`Network`] within its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NetworkId(pub(crate) usize);

/// Handle to a [`Volume`] within its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct VolumeId(pub(crate) usize);

/// Handle to a [`Config`] within its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConfigId(pub(crate) usize);

/// Handle to a [`Secret`] within its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SecretId(pub(crate) usize);

/// The fully resolved project graph.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    /// Project name.
    pub name: String,
    /// Services, in declaration order. Handles index into this list.
    pub services: Vec<Service>,
    /// Top-level networks, in declaration order.
    pub networks: Vec<Network>,
    /// Top-level volumes, in declaration order.
    pub volumes: Vec<Volume>,
    /// Top-level configs, in declaration order.
    pub configs: Vec<Config>,
    /// Top-level secrets, in declaration order.
    pub secrets: Vec<Secret>,
}

impl Project {
    /// The service behind a handle.
    #[must_use]
    pub fn service(&self, id: ServiceId) -> &Service {
        &self.services[id.0]
    }

    /// Looks a service up by name.
    #[must_use]
    pub fn service_named(&self, name: &str) -> Option<ServiceId> {
        self.services
            .iter()
            .position(|s| s.name == name)
            .map(ServiceId)
    }

    /// Startup order derived from the `depends_on` graph: dependencies
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`stackfile_common::error::ComposeError::DependencyCycle`]
    /// when `depends_on` edges form a cycle.
    pub fn startup_order(&self) -> Result<Vec<ServiceId>> {
        crate::graph::startup_order(self)
    }
}

/// One deployable unit.
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    /// Service name, unique within the project.
    pub name: String,
    /// Image reference; present exactly when `build` is absent.
    pub image: Option<String>,
    /// Build specification; present exactly when `image` is absent.
    pub build: Option<BuildSpec>,
    /// Command override.
    pub command: Option<Command>,
    /// Entrypoint override.
    pub entrypoint: Option<Command>,
    /// Environment variables, with `env_file` contents folded in.
    pub environment: BTreeMap<String, String>,
    /// Labels, with `label_file` contents folded in.
    pub labels: BTreeMap<String, String>,
    /// Resolved dependency edges, in declaration order.
    pub depends_on: Vec<Dependency>,
    /// Resolved links to sibling services.
    pub links: Vec<Link>,
    /// Volume and bind mounts, in declaration order.
    pub mounts: Vec<Mount>,
    /// Services whose mounts are inherited.
    pub volumes_from: Vec<VolumesFrom>,
    /// Networking attachment of the service.
    pub networking: NetworkingMode,
    /// Resource limits requested from the runtime.
    pub limits: ResourceLimits,
    /// Restart policy.
    pub restart: RestartPolicy,
    /// Configs granted to the service.
    pub configs: Vec<ConfigGrant>,
    /// Secrets granted to the service.
    pub secrets: Vec<SecretGrant>,
    /// Health probe declaration, passed through to the runtime.
    pub healthcheck: Option<Healthcheck>,
    /// User the process runs as.
    pub user: Option<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Hostname inside the container.
    pub hostname: Option<String>,
}

/// Build specification for a service built from source.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSpec {
    /// Build context directory.
    pub context: PathBuf,
    /// Dockerfile path relative to the context.
    pub dockerfile: Option<String>,
    /// Build arguments.
    pub args: BTreeMap<String, String>,
    /// Target build stage.
    pub target: Option<String>,
}

/// Command override, preserving whether the author wrote shell or exec
/// form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Command {
    /// A single string, interpreted by the runtime's shell.
    Shell(String),
    /// An argv list, executed directly.
    Exec(Vec<String>),
}

/// A resolved dependency edge.
#[derive(Debug, Clone, Serialize)]
pub struct Dependency {
    /// The service depended upon.
    pub service: ServiceId,
    /// Condition the dependency must reach.
    pub condition: DependencyCondition,
    /// Restart this service when the dependency is restarted.
    pub restart: bool,
    /// Whether the dependency must be present for startup to proceed.
    pub required: bool,
}

/// A resolved link to a sibling service.
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    /// Target service.
    pub service: ServiceId,
    /// Alias under which the target is reachable, if renamed.
    pub alias: Option<String>,
}

/// Mount inheritance from another service.
#[derive(Debug, Clone, Serialize)]
pub struct VolumesFrom {
    /// Service whose mounts are inherited.
    pub service: ServiceId,
    /// Inherit read-only.
    pub read_only: bool,
}

/// One storage attachment.
#[derive(Debug, Clone, Serialize)]
pub enum Mount {
    /// A named volume declared at the top level.
    Volume {
        /// The declared volume.
        source: VolumeId,
        /// Mount point inside the container.
        target: String,
        /// Mounted read-only.
        read_only: bool,
    },
    /// A host path bind mount.
    Bind {
        /// Host path.
        source: PathBuf,
        /// Mount point inside the container.
        target: String,
        /// Mounted read-only.
        read_only: bool,
    },
    /// An anonymous volume private to the container.
    Anonymous {
        /// Mount point inside the container.
        target: String,
    },
}

/// A published port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    /// Host interface to bind, when restricted.
    pub host_ip: Option<String>,
    /// Host port; `None` lets the runtime pick an ephemeral port.
    pub published: Option<u16>,
    /// Container port.
    pub target: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (the default).
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

/// Networking attachment of a service. Modeled as a tagged variant so
/// that illegal combinations (host networking with published ports)
/// cannot be represented.
#[derive(Debug, Clone, Serialize)]
pub enum NetworkingMode {
    /// Attached to named networks with optional published ports.
    Bridge {
        /// Network attachments, in declaration order.
        attachments: Vec<Attachment>,
        /// Published ports.
        ports: Vec<PortMapping>,
        /// Ports exposed to linked services without publishing.
        expose: Vec<String>,
    },
    /// Shares the host network namespace.
    Host,
    /// No networking.
    None,
    /// Shares the network namespace of another service.
    Service(ServiceId),
    /// Shares the namespace of an externally managed container.
    Container(String),
}

/// Attachment of a service to one network.
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    /// The declared network.
    pub network: NetworkId,
    /// Additional names the service answers to on this network.
    pub aliases: Vec<String>,
}

/// A top-level network declaration.
#[derive(Debug, Clone, Serialize)]
pub struct Network {
    /// Network name.
    pub name: String,
    /// Driver, when overridden.
    pub driver: Option<String>,
    /// Driver options.
    pub driver_opts: BTreeMap<String, String>,
    /// Provisioned outside this project.
    pub external: bool,
}

/// A top-level volume declaration. Lifetime is independent of any
/// service: created on first use, persists across restarts.
#[derive(Debug, Clone, Serialize)]
pub struct Volume {
    /// Volume name.
    pub name: String,
    /// Driver, when overridden.
    pub driver: Option<String>,
    /// Provisioned outside this project.
    pub external: bool,
}

/// Where the content of a config or secret comes from.
#[derive(Debug, Clone, Serialize)]
pub enum FileSource {
    /// Content read from a local file.
    File(PathBuf),
    /// Provisioned by the platform, outside this project.
    External,
}

/// A top-level config declaration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Config name.
    pub name: String,
    /// Content source.
    pub source: FileSource,
}

/// A top-level secret declaration.
#[derive(Debug, Clone, Serialize)]
pub struct Secret {
    /// Secret name.
    pub name: String,
    /// Content source.
    pub source: FileSource,
}

/// Grant of a config to a service.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigGrant {
    /// The granted config.
    pub config: ConfigId,
    /// Mount target inside the container; the runtime default applies
    /// when absent.
    pub target: Option<String>,
    /// Ownership and permission bits.
    pub ownership: FileOwnership,
}

/// Grant of a secret to a service.
#[derive(Debug, Clone, Serialize)]
pub struct SecretGrant {
    /// The granted secret.
    pub secret: SecretId,
    /// Mount target inside the container.
    pub target: Option<String>,
    /// Ownership and permission bits.
    pub ownership: FileOwnership,
}

/// Health probe declaration, not executed here.
#[derive(Debug, Clone, Serialize)]
pub struct Healthcheck {
    /// Probe command.
    pub test: Command,
    /// Interval between probes.
    pub interval: Option<String>,
    /// Probe timeout.
    pub timeout: Option<String>,
    /// Failures tolerated before unhealthy.
    pub retries: Option<u32>,
    /// Grace period after startup.
    pub start_period: Option<String>,
    /// Disables any image-defined probe.
    pub disable: bool,
}
