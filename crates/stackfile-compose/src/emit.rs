//! Normalized model emission.
//!
//! Converts merged, reference-checked service definitions into the typed
//! [`Project`]. All symbolic names become handles here; conflicts that
//! `extends` merging may have introduced (host networking with ports,
//! build next to image) are re-checked on the merged result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use stackfile_common::constants::DEFAULT_PROJECT_NAME;
use stackfile_common::error::{ComposeError, ErrorSet, Result};
use stackfile_common::options::ResolveOptions;
use stackfile_common::types::{
    DependencyCondition, FileOwnership, ResourceLimits, RestartPolicy, parse_byte_size,
};

use crate::loader::{get, scalar_to_bool, scalar_to_string};
use crate::model::{
    Attachment, BuildSpec, Command, Config, ConfigGrant, Dependency, FileSource, Healthcheck,
    Link, Mount, Network, NetworkingMode, PortMapping, Project, Protocol, Secret, SecretGrant,
    Service, Volume, VolumesFrom,
};
use crate::resolver::{Registry, is_host_path};
use crate::{merge, schema};

/// Builds the final [`Project`] from the resolved service definitions
/// and the top-level sections of the document.
///
/// # Errors
///
/// Collects one error per failing service plus any failures in the
/// top-level sections; on any error no project is returned.
pub fn emit_project(
    doc: &Mapping,
    services: &BTreeMap<String, Mapping>,
    registry: &Registry,
    origin: &Path,
    opts: &ResolveOptions,
) -> std::result::Result<Project, ErrorSet> {
    tracing::debug!("emitting normalized model");
    let mut errors = ErrorSet::new();

    let mut emitted = Vec::new();
    for name in registry.services() {
        let Some(definition) = services.get(name) else {
            continue;
        };
        match emit_service(name, definition, registry, opts) {
            Ok(service) => emitted.push(service),
            Err(err) => errors.push(err),
        }
    }

    let networks = emit_networks(doc);
    let volumes = emit_volumes(doc);
    let configs = emit_file_objects(doc, "configs", opts, &mut errors)
        .into_iter()
        .map(|(name, source)| Config { name, source })
        .collect();
    let secrets = emit_file_objects(doc, "secrets", opts, &mut errors)
        .into_iter()
        .map(|(name, source)| Secret { name, source })
        .collect();

    let project = Project {
        name: project_name(doc, origin),
        services: emitted,
        networks,
        volumes,
        configs,
        secrets,
    };
    errors.into_result(project)
}

fn project_name(doc: &Mapping, origin: &Path) -> String {
    if let Some(name) = get(doc, "name").and_then(scalar_to_string) {
        return name;
    }
    origin
        .parent()
        .and_then(Path::file_name)
        .map_or_else(
            || DEFAULT_PROJECT_NAME.to_string(),
            |dir| dir.to_string_lossy().into_owned(),
        )
}

/// First-error-wins conversion of one merged service definition.
fn emit_service(
    name: &str,
    definition: &Mapping,
    registry: &Registry,
    opts: &ResolveOptions,
) -> Result<Service> {
    let path = format!("services.{name}");
    schema::check_networking_conflicts(&path, definition)?;
    schema::check_target_conflict(&path, definition)?;

    let image = get(definition, "image").and_then(scalar_to_string);
    let build = match get(definition, "build") {
        Some(value) => Some(emit_build(&format!("{path}.build"), value)?),
        None => None,
    };
    if image.is_none() && build.is_none() {
        return Err(ComposeError::Schema {
            path,
            reason: "service has neither image nor build; one is required".into(),
        });
    }

    Ok(Service {
        name: name.to_string(),
        image,
        build,
        command: get(definition, "command").map(emit_command),
        entrypoint: get(definition, "entrypoint").map(emit_command),
        environment: emit_key_values(get(definition, "environment"), Some(opts)),
        labels: emit_key_values(get(definition, "labels"), None),
        depends_on: emit_depends_on(&path, get(definition, "depends_on"), registry)?,
        links: emit_links(&path, get(definition, "links"), registry)?,
        mounts: emit_mounts(&path, get(definition, "volumes"), registry)?,
        volumes_from: emit_volumes_from(&path, get(definition, "volumes_from"), registry)?,
        networking: emit_networking(&path, definition, registry)?,
        limits: emit_limits(&path, definition)?,
        restart: get(definition, "restart")
            .and_then(scalar_to_string)
            .and_then(|text| RestartPolicy::parse(&text))
            .unwrap_or_default(),
        configs: emit_config_grants(&path, get(definition, "configs"), registry)?,
        secrets: emit_secret_grants(&path, get(definition, "secrets"), registry)?,
        healthcheck: match get(definition, "healthcheck") {
            Some(value) => Some(emit_healthcheck(&format!("{path}.healthcheck"), value)?),
            None => None,
        },
        user: get(definition, "user").and_then(scalar_to_string),
        working_dir: get(definition, "working_dir").and_then(scalar_to_string),
        hostname: get(definition, "hostname").and_then(scalar_to_string),
    })
}

fn emit_build(path: &str, value: &Value) -> Result<BuildSpec> {
    if let Some(context) = scalar_to_string(value) {
        return Ok(BuildSpec {
            context: PathBuf::from(context),
            dockerfile: None,
            args: BTreeMap::new(),
            target: None,
        });
    }
    let map = value.as_mapping().ok_or_else(|| ComposeError::Schema {
        path: path.to_string(),
        reason: "expected a string or a mapping".into(),
    })?;
    Ok(BuildSpec {
        context: PathBuf::from(
            get(map, "context")
                .and_then(scalar_to_string)
                .unwrap_or_else(|| ".".to_string()),
        ),
        dockerfile: get(map, "dockerfile").and_then(scalar_to_string),
        args: emit_key_values(get(map, "args"), None),
        target: get(map, "target").and_then(scalar_to_string),
    })
}

fn emit_command(value: &Value) -> Command {
    match value {
        Value::Sequence(items) => {
            Command::Exec(items.iter().filter_map(scalar_to_string).collect())
        }
        _ => Command::Shell(scalar_to_string(value).unwrap_or_default()),
    }
}

/// Renders `environment`/`labels`/`args` entries into a string map.
/// When `opts` is given, null values pull the variable from the captured
/// environment and are dropped when absent there; otherwise nulls become
/// empty strings.
fn emit_key_values(
    value: Option<&Value>,
    opts: Option<&ResolveOptions>,
) -> BTreeMap<String, String> {
    let Some(value) = value else {
        return BTreeMap::new();
    };
    let mut out = BTreeMap::new();
    for (key, entry) in merge::keyed_entries(value) {
        let rendered = match entry {
            Value::Null => match opts {
                Some(opts) => match opts.variables.get(&key) {
                    Some(inherited) => inherited.clone(),
                    None => continue,
                },
                None => String::new(),
            },
            other => scalar_to_string(&other).unwrap_or_default(),
        };
        let _ = out.insert(key, rendered);
    }
    out
}

fn emit_depends_on(
    path: &str,
    value: Option<&Value>,
    registry: &Registry,
) -> Result<Vec<Dependency>> {
    let mut deps = Vec::new();
    match value {
        None => {}
        Some(Value::Sequence(items)) => {
            for item in items.iter().filter_map(scalar_to_string) {
                deps.push(Dependency {
                    service: lookup_service(registry, &item, &format!("{path}.depends_on"))?,
                    condition: DependencyCondition::default(),
                    restart: false,
                    required: true,
                });
            }
        }
        Some(Value::Mapping(entries)) => {
            for (key, body) in entries {
                let Some(target) = scalar_to_string(key) else {
                    continue;
                };
                let entry_path = format!("{path}.depends_on.{target}");
                let body = body.as_mapping();
                let condition = match body.and_then(|m| get(m, "condition")) {
                    Some(value) => {
                        let text = scalar_to_string(value).unwrap_or_default();
                        DependencyCondition::parse(&text).ok_or_else(|| ComposeError::Schema {
                            path: format!("{entry_path}.condition"),
                            reason: "unknown dependency condition".into(),
                        })?
                    }
                    None => DependencyCondition::default(),
                };
                deps.push(Dependency {
                    service: lookup_service(registry, &target, &entry_path)?,
                    condition,
                    restart: body
                        .and_then(|m| get(m, "restart"))
                        .and_then(scalar_to_bool)
                        .unwrap_or(false),
                    required: body
                        .and_then(|m| get(m, "required"))
                        .and_then(scalar_to_bool)
                        .unwrap_or(true),
                });
            }
        }
        Some(_) => {}
    }
    Ok(deps)
}

fn emit_links(path: &str, value: Option<&Value>, registry: &Registry) -> Result<Vec<Link>> {
    let mut links = Vec::new();
    for entry in sequence_strings(value) {
        let (target, alias) = match entry.split_once(':') {
            Some((target, alias)) => (target.to_string(), Some(alias.to_string())),
            None => (entry, None),
        };
        links.push(Link {
            service: lookup_service(registry, &target, &format!("{path}.links"))?,
            alias,
        });
    }
    Ok(links)
}

fn emit_volumes_from(
    path: &str,
    value: Option<&Value>,
    registry: &Registry,
) -> Result<Vec<VolumesFrom>> {
    let mut inherited = Vec::new();
    for entry in sequence_strings(value) {
        // References to externally managed containers are opaque to the
        // model and left for the runtime.
        if entry.starts_with("container:") {
            continue;
        }
        let (target, read_only) = match entry.strip_suffix(":ro") {
            Some(target) => (target.to_string(), true),
            None => (
                entry.strip_suffix(":rw").unwrap_or(&entry).to_string(),
                false,
            ),
        };
        inherited.push(VolumesFrom {
            service: lookup_service(registry, &target, &format!("{path}.volumes_from"))?,
            read_only,
        });
    }
    Ok(inherited)
}

fn emit_mounts(path: &str, value: Option<&Value>, registry: &Registry) -> Result<Vec<Mount>> {
    let Some(items) = value.and_then(Value::as_sequence) else {
        return Ok(Vec::new());
    };
    let mut mounts = Vec::new();
    for (idx, entry) in items.iter().enumerate() {
        let entry_path = format!("{path}.volumes.{idx}");
        match entry {
            Value::Mapping(map) => mounts.push(emit_long_mount(&entry_path, map, registry)?),
            _ => {
                let text = scalar_to_string(entry).ok_or_else(|| ComposeError::Schema {
                    path: entry_path.clone(),
                    reason: "expected a mount string".into(),
                })?;
                mounts.push(emit_short_mount(&entry_path, &text, registry)?);
            }
        }
    }
    Ok(mounts)
}

fn emit_short_mount(path: &str, text: &str, registry: &Registry) -> Result<Mount> {
    let parts: Vec<&str> = text.splitn(3, ':').collect();
    match parts.as_slice() {
        [target] => Ok(Mount::Anonymous {
            target: (*target).to_string(),
        }),
        [source, target] | [source, target, _] => {
            let read_only = parts.len() == 3 && parts[2] == "ro";
            if is_host_path(source) {
                Ok(Mount::Bind {
                    source: PathBuf::from(*source),
                    target: (*target).to_string(),
                    read_only,
                })
            } else {
                let volume = registry
                    .volume_id(source)
                    .ok_or_else(|| unresolved("volume", source, path))?;
                Ok(Mount::Volume {
                    source: volume,
                    target: (*target).to_string(),
                    read_only,
                })
            }
        }
        _ => Err(ComposeError::Schema {
            path: path.to_string(),
            reason: "malformed mount string".into(),
        }),
    }
}

fn emit_long_mount(path: &str, map: &Mapping, registry: &Registry) -> Result<Mount> {
    let target = get(map, "target")
        .and_then(scalar_to_string)
        .ok_or_else(|| ComposeError::Schema {
            path: path.to_string(),
            reason: "a target key is required".into(),
        })?;
    let read_only = get(map, "read_only")
        .and_then(scalar_to_bool)
        .unwrap_or(false);
    let mount_type = get(map, "type")
        .and_then(scalar_to_string)
        .unwrap_or_else(|| "volume".to_string());
    let source = get(map, "source").and_then(scalar_to_string);

    match (mount_type.as_str(), source) {
        ("bind", Some(source)) => Ok(Mount::Bind {
            source: PathBuf::from(source),
            target,
            read_only,
        }),
        ("volume", Some(source)) => {
            let volume = registry
                .volume_id(&source)
                .ok_or_else(|| unresolved("volume", &source, path))?;
            Ok(Mount::Volume {
                source: volume,
                target,
                read_only,
            })
        }
        ("volume", None) => Ok(Mount::Anonymous { target }),
        ("bind", None) => Err(ComposeError::Schema {
            path: path.to_string(),
            reason: "bind mounts require a source".into(),
        }),
        (other, _) => Err(ComposeError::Schema {
            path: format!("{path}.type"),
            reason: format!("unknown mount type \"{other}\""),
        }),
    }
}

fn emit_networking(path: &str, definition: &Mapping, registry: &Registry) -> Result<NetworkingMode> {
    if let Some(mode) = get(definition, "network_mode").and_then(scalar_to_string) {
        return match mode.as_str() {
            "host" => Ok(NetworkingMode::Host),
            "none" => Ok(NetworkingMode::None),
            "bridge" => Ok(NetworkingMode::Bridge {
                attachments: Vec::new(),
                ports: emit_ports(path, get(definition, "ports"))?,
                expose: sequence_strings(get(definition, "expose")),
            }),
            other => {
                if let Some(target) = other.strip_prefix("service:") {
                    let service = lookup_service(
                        registry,
                        target,
                        &format!("{path}.network_mode"),
                    )?;
                    Ok(NetworkingMode::Service(service))
                } else if let Some(container) = other.strip_prefix("container:") {
                    Ok(NetworkingMode::Container(container.to_string()))
                } else {
                    Err(ComposeError::Schema {
                        path: format!("{path}.network_mode"),
                        reason: format!("unknown network mode \"{other}\""),
                    })
                }
            }
        };
    }

    let attachments = emit_attachments(path, get(definition, "networks"), registry)?;
    Ok(NetworkingMode::Bridge {
        attachments,
        ports: emit_ports(path, get(definition, "ports"))?,
        expose: sequence_strings(get(definition, "expose")),
    })
}

fn emit_attachments(
    path: &str,
    value: Option<&Value>,
    registry: &Registry,
) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::new();
    match value {
        None => {}
        Some(Value::Sequence(items)) => {
            for name in items.iter().filter_map(scalar_to_string) {
                attachments.push(Attachment {
                    network: lookup_network(registry, &name, &format!("{path}.networks"))?,
                    aliases: Vec::new(),
                });
            }
        }
        Some(Value::Mapping(entries)) => {
            for (key, body) in entries {
                let Some(name) = scalar_to_string(key) else {
                    continue;
                };
                let aliases = body
                    .as_mapping()
                    .and_then(|map| get(map, "aliases"))
                    .map(|aliases| sequence_strings(Some(aliases)))
                    .unwrap_or_default();
                attachments.push(Attachment {
                    network: lookup_network(registry, &name, &format!("{path}.networks.{name}"))?,
                    aliases,
                });
            }
        }
        Some(_) => {}
    }
    Ok(attachments)
}

fn emit_ports(path: &str, value: Option<&Value>) -> Result<Vec<PortMapping>> {
    let Some(items) = value.and_then(Value::as_sequence) else {
        return Ok(Vec::new());
    };
    let mut ports = Vec::new();
    for (idx, entry) in items.iter().enumerate() {
        let entry_path = format!("{path}.ports.{idx}");
        match entry {
            Value::Mapping(map) => {
                let target = get(map, "target")
                    .and_then(scalar_to_string)
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| ComposeError::Schema {
                        path: entry_path.clone(),
                        reason: "a numeric target port is required".into(),
                    })?;
                let published = match get(map, "published").and_then(scalar_to_string) {
                    Some(text) => Some(text.parse().map_err(|_| ComposeError::Schema {
                        path: format!("{entry_path}.published"),
                        reason: format!("not a port number: \"{text}\""),
                    })?),
                    None => None,
                };
                ports.push(PortMapping {
                    host_ip: get(map, "host_ip").and_then(scalar_to_string),
                    published,
                    target,
                    protocol: parse_protocol(
                        &entry_path,
                        get(map, "protocol").and_then(scalar_to_string),
                    )?,
                });
            }
            _ => {
                let text = scalar_to_string(entry).ok_or_else(|| ComposeError::Schema {
                    path: entry_path.clone(),
                    reason: "expected a port string".into(),
                })?;
                ports.extend(parse_short_ports(&entry_path, &text)?);
            }
        }
    }
    Ok(ports)
}

/// Short port syntax: `TARGET`, `PUBLISHED:TARGET`, or
/// `HOST_IP:PUBLISHED:TARGET`, each optionally `/udp`, with matching
/// `from-to` ranges expanded pairwise.
fn parse_short_ports(path: &str, text: &str) -> Result<Vec<PortMapping>> {
    let (mapping, protocol) = match text.split_once('/') {
        Some((mapping, proto)) => (mapping, parse_protocol(path, Some(proto.to_string()))?),
        None => (text, Protocol::Tcp),
    };

    let malformed = || ComposeError::Schema {
        path: path.to_string(),
        reason: format!("malformed port mapping \"{text}\""),
    };

    let parts: Vec<&str> = mapping.rsplitn(3, ':').collect();
    let (host_ip, published, target) = match parts.as_slice() {
        [target] => (None, None, *target),
        [target, published] => (None, Some(*published), *target),
        [target, published, host_ip] => (Some((*host_ip).to_string()), Some(*published), *target),
        _ => return Err(malformed()),
    };

    let targets = parse_span(target).ok_or_else(malformed)?;
    let published = match published {
        Some(span) => Some(parse_span(span).ok_or_else(malformed)?),
        None => None,
    };

    match published {
        None => Ok(targets
            .map(|port| PortMapping {
                host_ip: host_ip.clone(),
                published: None,
                target: port,
                protocol,
            })
            .collect()),
        Some(published) => {
            if published.len() != targets.len() {
                return Err(ComposeError::Schema {
                    path: path.to_string(),
                    reason: "published and target port ranges differ in length".into(),
                });
            }
            Ok(published
                .zip(targets)
                .map(|(host, container)| PortMapping {
                    host_ip: host_ip.clone(),
                    published: Some(host),
                    target: container,
                    protocol,
                })
                .collect())
        }
    }
}

/// `80` or `8000-8010` as an inclusive range.
fn parse_span(text: &str) -> Option<std::ops::RangeInclusive<u16>> {
    match text.split_once('-') {
        Some((from, to)) => {
            let from: u16 = from.parse().ok()?;
            let to: u16 = to.parse().ok()?;
            (from <= to).then(|| from..=to)
        }
        None => {
            let port: u16 = text.parse().ok()?;
            Some(port..=port)
        }
    }
}

fn parse_protocol(path: &str, value: Option<String>) -> Result<Protocol> {
    match value.as_deref() {
        None | Some("tcp") => Ok(Protocol::Tcp),
        Some("udp") => Ok(Protocol::Udp),
        Some(other) => Err(ComposeError::Schema {
            path: format!("{path}.protocol"),
            reason: format!("unknown protocol \"{other}\""),
        }),
    }
}

fn emit_limits(path: &str, definition: &Mapping) -> Result<ResourceLimits> {
    let Some(limits) = get(definition, "deploy")
        .and_then(Value::as_mapping)
        .and_then(|deploy| get(deploy, "resources"))
        .and_then(Value::as_mapping)
        .and_then(|resources| get(resources, "limits"))
        .and_then(Value::as_mapping)
    else {
        return Ok(ResourceLimits::default());
    };
    let limits_path = format!("{path}.deploy.resources.limits");

    let cpus = match get(limits, "cpus").and_then(scalar_to_string) {
        Some(text) => Some(text.parse().map_err(|_| ComposeError::Schema {
            path: format!("{limits_path}.cpus"),
            reason: format!("not a number: \"{text}\""),
        })?),
        None => None,
    };
    let memory_bytes = match get(limits, "memory").and_then(scalar_to_string) {
        Some(text) => Some(parse_byte_size(&text).ok_or_else(|| ComposeError::Schema {
            path: format!("{limits_path}.memory"),
            reason: format!("not a byte size: \"{text}\""),
        })?),
        None => None,
    };
    let pids = match get(limits, "pids").and_then(scalar_to_string) {
        Some(text) => Some(text.parse().map_err(|_| ComposeError::Schema {
            path: format!("{limits_path}.pids"),
            reason: format!("not a number: \"{text}\""),
        })?),
        None => None,
    };

    Ok(ResourceLimits {
        cpus,
        memory_bytes,
        pids,
    })
}

fn emit_config_grants(
    path: &str,
    value: Option<&Value>,
    registry: &Registry,
) -> Result<Vec<ConfigGrant>> {
    emit_grants(path, "configs", value, |source, from| {
        registry
            .config_id(source)
            .ok_or_else(|| unresolved("config", source, from))
    })
    .map(|grants| {
        grants
            .into_iter()
            .map(|(config, target, ownership)| ConfigGrant {
                config,
                target,
                ownership,
            })
            .collect()
    })
}

fn emit_secret_grants(
    path: &str,
    value: Option<&Value>,
    registry: &Registry,
) -> Result<Vec<SecretGrant>> {
    emit_grants(path, "secrets", value, |source, from| {
        registry
            .secret_id(source)
            .ok_or_else(|| unresolved("secret", source, from))
    })
    .map(|grants| {
        grants
            .into_iter()
            .map(|(secret, target, ownership)| SecretGrant {
                secret,
                target,
                ownership,
            })
            .collect()
    })
}

fn emit_grants<Id>(
    path: &str,
    key: &str,
    value: Option<&Value>,
    lookup: impl Fn(&str, &str) -> Result<Id>,
) -> Result<Vec<(Id, Option<String>, FileOwnership)>> {
    let Some(items) = value.and_then(Value::as_sequence) else {
        return Ok(Vec::new());
    };
    let mut grants = Vec::new();
    for (idx, entry) in items.iter().enumerate() {
        let entry_path = format!("{path}.{key}.{idx}");
        match entry {
            Value::Mapping(map) => {
                let source = get(map, "source")
                    .and_then(scalar_to_string)
                    .ok_or_else(|| ComposeError::Schema {
                        path: entry_path.clone(),
                        reason: "a source key is required".into(),
                    })?;
                let id = lookup(&source, &entry_path)?;
                grants.push((
                    id,
                    get(map, "target").and_then(scalar_to_string),
                    FileOwnership {
                        uid: get(map, "uid").and_then(scalar_to_string),
                        gid: get(map, "gid").and_then(scalar_to_string),
                        mode: get(map, "mode").and_then(parse_mode),
                    },
                ));
            }
            _ => {
                let source =
                    scalar_to_string(entry).ok_or_else(|| ComposeError::Schema {
                        path: entry_path.clone(),
                        reason: "expected a name".into(),
                    })?;
                let id = lookup(&source, &entry_path)?;
                grants.push((id, None, FileOwnership::default()));
            }
        }
    }
    Ok(grants)
}

/// Permission modes appear as YAML integers (`0o440`, `288`) or as
/// octal strings (`"0440"`).
fn parse_mode(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => u32::from_str_radix(s, 8).ok(),
        _ => None,
    }
}

fn emit_healthcheck(path: &str, value: &Value) -> Result<Healthcheck> {
    let map = value.as_mapping().ok_or_else(|| ComposeError::Schema {
        path: path.to_string(),
        reason: "expected a mapping".into(),
    })?;
    Ok(Healthcheck {
        test: get(map, "test").map(emit_command).unwrap_or_else(|| {
            Command::Exec(Vec::new())
        }),
        interval: get(map, "interval").and_then(scalar_to_string),
        timeout: get(map, "timeout").and_then(scalar_to_string),
        retries: get(map, "retries")
            .and_then(scalar_to_string)
            .and_then(|text| text.parse().ok()),
        start_period: get(map, "start_period").and_then(scalar_to_string),
        disable: get(map, "disable").and_then(scalar_to_bool).unwrap_or(false),
    })
}

fn emit_networks(doc: &Mapping) -> Vec<Network> {
    let mut networks = Vec::new();
    let Some(entries) = get(doc, "networks").and_then(Value::as_mapping) else {
        return networks;
    };
    for (key, body) in entries {
        let Some(name) = scalar_to_string(key) else {
            continue;
        };
        let map = body.as_mapping();
        let driver_opts = map
            .and_then(|m| get(m, "driver_opts"))
            .map(|opts| emit_key_values(Some(opts), None))
            .unwrap_or_default();
        let external = map
            .and_then(|m| get(m, "external"))
            .is_some_and(external_flag);
        networks.push(Network {
            name,
            driver: map.and_then(|m| get(m, "driver")).and_then(scalar_to_string),
            driver_opts,
            external,
        });
    }
    networks
}

fn emit_volumes(doc: &Mapping) -> Vec<Volume> {
    let mut volumes = Vec::new();
    let Some(entries) = get(doc, "volumes").and_then(Value::as_mapping) else {
        return volumes;
    };
    for (key, body) in entries {
        let Some(name) = scalar_to_string(key) else {
            continue;
        };
        let map = body.as_mapping();
        volumes.push(Volume {
            name,
            driver: map.and_then(|m| get(m, "driver")).and_then(scalar_to_string),
            external: map
                .and_then(|m| get(m, "external"))
                .is_some_and(external_flag),
        });
    }
    volumes
}

fn emit_file_objects(
    doc: &Mapping,
    section: &str,
    opts: &ResolveOptions,
    errors: &mut ErrorSet,
) -> Vec<(String, FileSource)> {
    let mut objects = Vec::new();
    let Some(entries) = get(doc, section).and_then(Value::as_mapping) else {
        return objects;
    };
    for (key, body) in entries {
        let Some(name) = scalar_to_string(key) else {
            continue;
        };
        let Some(map) = body.as_mapping() else {
            continue;
        };
        if let Some(file) = get(map, "file").and_then(scalar_to_string) {
            objects.push((name, FileSource::File(opts.working_dir.join(file))));
        } else if get(map, "external").and_then(scalar_to_bool).unwrap_or(false) {
            objects.push((name, FileSource::External));
        } else {
            errors.push(ComposeError::Schema {
                path: format!("{section}.{name}"),
                reason: "either file or external is required".into(),
            });
        }
    }
    objects
}

/// `external` is either a boolean or a mapping carrying an external name.
fn external_flag(value: &Value) -> bool {
    scalar_to_bool(value).unwrap_or_else(|| value.is_mapping())
}

fn lookup_service(
    registry: &Registry,
    name: &str,
    referenced_from: &str,
) -> Result<crate::model::ServiceId> {
    registry
        .service_id(name)
        .ok_or_else(|| unresolved("service", name, referenced_from))
}

fn lookup_network(
    registry: &Registry,
    name: &str,
    referenced_from: &str,
) -> Result<crate::model::NetworkId> {
    registry
        .network_id(name)
        .ok_or_else(|| unresolved("network", name, referenced_from))
}

fn sequence_strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_sequence)
        .map(|items| items.iter().filter_map(scalar_to_string).collect())
        .unwrap_or_default()
}

fn unresolved(kind: &'static str, name: &str, referenced_from: &str) -> ComposeError {
    ComposeError::UnresolvedReference {
        kind,
        name: name.to_string(),
        referenced_from: referenced_from.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit(text: &str) -> std::result::Result<Project, ErrorSet> {
        let doc: Mapping = serde_yaml::from_str(text).expect("fixture should parse");
        let registry = Registry::from_document(&doc);
        let opts = ResolveOptions::new(PathBuf::from("."), BTreeMap::new());
        let mut resolver = crate::resolver::Resolver::new(&opts, &registry);
        let services = resolver.resolve_services(&doc, Path::new("app/compose.yaml"))?;
        emit_project(&doc, &services, &registry, Path::new("app/compose.yaml"), &opts)
    }

    #[test]
    fn emits_minimal_service() {
        let project = emit("services:\n  web:\n    image: nginx:1.27\n").expect("should emit");
        assert_eq!(project.name, "app");
        assert_eq!(project.services[0].image.as_deref(), Some("nginx:1.27"));
        assert!(matches!(
            project.services[0].networking,
            NetworkingMode::Bridge { .. }
        ));
    }

    #[test]
    fn project_name_prefers_declared_name() {
        let project =
            emit("name: shop\nservices:\n  web:\n    image: nginx\n").expect("should emit");
        assert_eq!(project.name, "shop");
    }

    #[test]
    fn service_without_image_or_build_fails() {
        let err = emit("services:\n  web:\n    restart: always\n").unwrap_err();
        assert!(
            err.to_string().contains("neither image nor build"),
            "got: {err}"
        );
    }

    #[test]
    fn short_ports_parse_all_forms() {
        let project = emit(
            "services:\n  web:\n    image: nginx\n    ports:\n    - 80\n    - 8080:80\n    - 127.0.0.1:8443:443\n    - 514:514/udp\n",
        )
        .expect("should emit");
        let NetworkingMode::Bridge { ports, .. } = &project.services[0].networking else {
            panic!("expected bridge networking");
        };
        assert_eq!(ports.len(), 4);
        assert_eq!(ports[0].published, None);
        assert_eq!(ports[0].target, 80);
        assert_eq!(ports[1].published, Some(8080));
        assert_eq!(ports[2].host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(ports[3].protocol, Protocol::Udp);
    }

    #[test]
    fn port_ranges_expand_pairwise() {
        let project = emit(
            "services:\n  web:\n    image: nginx\n    ports:\n    - 8000-8002:9000-9002\n",
        )
        .expect("should emit");
        let NetworkingMode::Bridge { ports, .. } = &project.services[0].networking else {
            panic!("expected bridge networking");
        };
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].published, Some(8000));
        assert_eq!(ports[0].target, 9000);
        assert_eq!(ports[2].published, Some(8002));
        assert_eq!(ports[2].target, 9002);
    }

    #[test]
    fn mismatched_port_ranges_fail() {
        let err = emit(
            "services:\n  web:\n    image: nginx\n    ports:\n    - 8000-8005:9000-9001\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("differ in length"), "got: {err}");
    }

    #[test]
    fn long_form_port_rejects_bogus_published() {
        let err = emit(
            "services:\n  web:\n    image: nginx\n    ports:\n    - target: 80\n      published: notaport\n",
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ports.0.published"), "got: {msg}");
        assert!(msg.contains("notaport"), "got: {msg}");
    }

    #[test]
    fn long_form_port_without_published_stays_ephemeral() {
        let project = emit("services:\n  web:\n    image: nginx\n    ports:\n    - target: 80\n")
            .expect("should emit");
        let NetworkingMode::Bridge { ports, .. } = &project.services[0].networking else {
            panic!("expected bridge networking");
        };
        assert_eq!(ports[0].published, None);
        assert_eq!(ports[0].target, 80);
    }

    #[test]
    fn bogus_pids_limit_is_rejected() {
        let err = emit(
            "services:\n  web:\n    image: nginx\n    deploy:\n      resources:\n        limits:\n          pids: plenty\n",
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("limits.pids"), "got: {msg}");
        assert!(msg.contains("plenty"), "got: {msg}");
    }

    #[test]
    fn host_mode_with_merged_ports_conflicts() {
        // The conflict only appears after extends merging.
        let err = emit(
            "services:\n  base:\n    image: nginx\n    ports:\n    - 8080:80\n  web:\n    extends:\n      service: base\n    network_mode: host\n",
        )
        .unwrap_err();
        let has_conflict = err
            .errors()
            .iter()
            .any(|e| matches!(e, ComposeError::Conflict { .. }));
        assert!(has_conflict, "got: {err}");
    }

    #[test]
    fn depends_on_long_form_carries_flags() {
        let project = emit(
            "services:\n  web:\n    image: nginx\n    depends_on:\n      db:\n        condition: service_healthy\n        restart: true\n        required: false\n  db:\n    image: postgres\n",
        )
        .expect("should emit");
        let web = &project.services[0];
        assert_eq!(web.depends_on.len(), 1);
        let dep = &web.depends_on[0];
        assert_eq!(project.service(dep.service).name, "db");
        assert_eq!(dep.condition, DependencyCondition::ServiceHealthy);
        assert!(dep.restart);
        assert!(!dep.required);
    }

    #[test]
    fn mounts_resolve_to_typed_handles() {
        let project = emit(
            "services:\n  db:\n    image: postgres\n    volumes:\n    - pgdata:/var/lib/postgresql/data\n    - ./init:/docker-entrypoint-initdb.d:ro\n    - /var/cache\nvolumes:\n  pgdata: null\n",
        )
        .expect("should emit");
        let mounts = &project.services[0].mounts;
        assert_eq!(mounts.len(), 3);
        match &mounts[0] {
            Mount::Volume { source, read_only, .. } => {
                assert_eq!(project.volumes[source.0].name, "pgdata");
                assert!(!read_only);
            }
            other => panic!("expected volume mount, got {other:?}"),
        }
        assert!(matches!(&mounts[1], Mount::Bind { read_only: true, .. }));
        assert!(matches!(&mounts[2], Mount::Anonymous { .. }));
    }

    #[test]
    fn limits_parse_memory_and_cpus() {
        let project = emit(
            "services:\n  web:\n    image: nginx\n    deploy:\n      resources:\n        limits:\n          cpus: \"0.5\"\n          memory: 256M\n",
        )
        .expect("should emit");
        let limits = &project.services[0].limits;
        assert_eq!(limits.cpus, Some(0.5));
        assert_eq!(limits.memory_bytes, Some(256 * 1024 * 1024));
    }

    #[test]
    fn config_grants_resolve_with_ownership() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.conf"), "key=value\n").expect("write");
        let doc: Mapping = serde_yaml::from_str(
            "services:\n  web:\n    image: nginx\n    configs:\n    - source: app_cfg\n      target: /etc/app.conf\n      uid: \"1000\"\n      mode: \"0440\"\nconfigs:\n  app_cfg:\n    file: app.conf\n",
        )
        .expect("parse");
        let registry = Registry::from_document(&doc);
        let opts = ResolveOptions::new(dir.path().to_path_buf(), BTreeMap::new());
        let mut resolver = crate::resolver::Resolver::new(&opts, &registry);
        let services = resolver
            .resolve_services(&doc, &dir.path().join("compose.yaml"))
            .expect("resolve");
        let project = emit_project(
            &doc,
            &services,
            &registry,
            &dir.path().join("compose.yaml"),
            &opts,
        )
        .expect("emit");

        let grant = &project.services[0].configs[0];
        assert_eq!(project.configs[grant.config.0].name, "app_cfg");
        assert_eq!(grant.target.as_deref(), Some("/etc/app.conf"));
        assert_eq!(grant.ownership.uid.as_deref(), Some("1000"));
        assert_eq!(grant.ownership.mode, Some(0o440));
    }

    #[test]
    fn environment_null_pulls_from_captured_vars() {
        let doc: Mapping = serde_yaml::from_str(
            "services:\n  web:\n    image: nginx\n    environment:\n    - PRESENT\n    - ABSENT\n",
        )
        .expect("parse");
        let registry = Registry::from_document(&doc);
        let mut vars = BTreeMap::new();
        let _ = vars.insert("PRESENT".to_string(), "yes".to_string());
        let opts = ResolveOptions::new(PathBuf::from("."), vars);
        let mut resolver = crate::resolver::Resolver::new(&opts, &registry);
        let services = resolver
            .resolve_services(&doc, Path::new("compose.yaml"))
            .expect("resolve");
        let project = emit_project(&doc, &services, &registry, Path::new("compose.yaml"), &opts)
            .expect("emit");
        let env = &project.services[0].environment;
        assert_eq!(env.get("PRESENT").map(String::as_str), Some("yes"));
        assert!(!env.contains_key("ABSENT"));
    }

    #[test]
    fn networks_and_aliases_attach() {
        let project = emit(
            "services:\n  web:\n    image: nginx\n    networks:\n      frontend:\n        aliases: [www]\n      backend: null\nnetworks:\n  frontend: null\n  backend:\n    driver: bridge\n    external: false\n",
        )
        .expect("should emit");
        let NetworkingMode::Bridge { attachments, .. } = &project.services[0].networking else {
            panic!("expected bridge networking");
        };
        assert_eq!(attachments.len(), 2);
        assert_eq!(project.networks[attachments[0].network.0].name, "frontend");
        assert_eq!(attachments[0].aliases, vec!["www".to_string()]);
        assert_eq!(project.networks[1].driver.as_deref(), Some("bridge"));
    }
}
