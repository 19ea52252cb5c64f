//! Cross-reference resolution and file inclusion.
//!
//! Checks every symbolic reference against the top-level declarations,
//! loads `extends` fragments and `env_file`/`label_file` includes through
//! the loader, and applies `extends` inheritance via [`crate::merge`].
//!
//! The registry of top-level names is built once, before any service is
//! resolved; service resolution only reads from it. `extends` chains are
//! walked with an explicit visited set keyed by `(file, service)` pairs
//! along the active resolution path, so cycles fail fast with the full
//! chain instead of recursing forever.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use stackfile_common::constants::MAX_EXTENDS_DEPTH;
use stackfile_common::error::{ComposeError, ErrorSet, Result};
use stackfile_common::options::ResolveOptions;

use crate::loader::{get, scalar_to_string};
use crate::model::{ConfigId, NetworkId, SecretId, ServiceId, VolumeId};
use crate::{interpolate, loader, merge};

/// Immutable registry of top-level declaration names, in declaration
/// order. Built once per resolution run.
#[derive(Debug, Default)]
pub struct Registry {
    services: Vec<String>,
    networks: Vec<String>,
    volumes: Vec<String>,
    configs: Vec<String>,
    secrets: Vec<String>,
}

impl Registry {
    /// Collects the declared names of every category from the document.
    #[must_use]
    pub fn from_document(doc: &Mapping) -> Self {
        Self {
            services: section_names(doc, "services"),
            networks: section_names(doc, "networks"),
            volumes: section_names(doc, "volumes"),
            configs: section_names(doc, "configs"),
            secrets: section_names(doc, "secrets"),
        }
    }

    /// Handle of a declared service.
    #[must_use]
    pub fn service_id(&self, name: &str) -> Option<ServiceId> {
        position(&self.services, name).map(ServiceId)
    }

    /// Handle of a declared network.
    #[must_use]
    pub fn network_id(&self, name: &str) -> Option<NetworkId> {
        position(&self.networks, name).map(NetworkId)
    }

    /// Handle of a declared volume.
    #[must_use]
    pub fn volume_id(&self, name: &str) -> Option<VolumeId> {
        position(&self.volumes, name).map(VolumeId)
    }

    /// Handle of a declared config.
    #[must_use]
    pub fn config_id(&self, name: &str) -> Option<ConfigId> {
        position(&self.configs, name).map(ConfigId)
    }

    /// Handle of a declared secret.
    #[must_use]
    pub fn secret_id(&self, name: &str) -> Option<SecretId> {
        position(&self.secrets, name).map(SecretId)
    }

    /// Declared service names, in order.
    #[must_use]
    pub fn services(&self) -> &[String] {
        &self.services
    }
}

fn section_names(doc: &Mapping, section: &str) -> Vec<String> {
    get(doc, section)
        .and_then(Value::as_mapping)
        .map(|entries| entries.keys().filter_map(scalar_to_string).collect())
        .unwrap_or_default()
}

fn position(names: &[String], name: &str) -> Option<usize> {
    names.iter().position(|n| n == name)
}

/// Walks services, applying `extends`, folding included files, and
/// checking references. Holds a cache of loaded fragment documents.
pub struct Resolver<'a> {
    opts: &'a ResolveOptions,
    registry: &'a Registry,
    fragments: BTreeMap<PathBuf, Mapping>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over a pre-built registry.
    #[must_use]
    pub fn new(opts: &'a ResolveOptions, registry: &'a Registry) -> Self {
        Self {
            opts,
            registry,
            fragments: BTreeMap::new(),
        }
    }

    /// Resolves every service of the document independently. The first
    /// fatal error of each service is collected; other services are
    /// still resolved.
    ///
    /// # Errors
    ///
    /// Returns the collected per-service errors plus any failures in the
    /// top-level config/secret declarations.
    pub fn resolve_services(
        &mut self,
        doc: &Mapping,
        origin: &Path,
    ) -> std::result::Result<BTreeMap<String, Mapping>, ErrorSet> {
        let mut errors = ErrorSet::new();
        let mut resolved = BTreeMap::new();

        self.check_declared_files(doc, &mut errors);

        for name in self.registry.services() {
            match self.resolve_service(doc, origin, name) {
                Ok(service) => {
                    let _ = resolved.insert(name.clone(), service);
                }
                Err(err) => errors.push(err),
            }
        }

        errors.into_result(resolved)
    }

    fn resolve_service(&mut self, doc: &Mapping, origin: &Path, name: &str) -> Result<Mapping> {
        tracing::debug!(service = name, "resolving service");
        let mut chain = Vec::new();
        let merged = self.apply_extends(doc, origin, name, &mut chain)?;
        let folded = self.fold_included_files(merged)?;
        self.check_references(name, &folded)?;
        Ok(folded)
    }

    /// Resolves the `extends` chain of `service` within `doc`, returning
    /// the fully merged definition with the `extends` key stripped.
    fn apply_extends(
        &mut self,
        doc: &Mapping,
        file: &Path,
        service: &str,
        chain: &mut Vec<(PathBuf, String)>,
    ) -> Result<Mapping> {
        let link = (file.to_path_buf(), service.to_string());
        if chain.contains(&link) {
            chain.push(link);
            return Err(ComposeError::CyclicExtends {
                chain: render_chain(chain),
            });
        }
        if chain.len() >= MAX_EXTENDS_DEPTH {
            return Err(ComposeError::CyclicExtends {
                chain: format!("{} (depth limit reached)", render_chain(chain)),
            });
        }
        chain.push(link);

        let mut child = fragment_service(doc, service)
            .ok_or_else(|| ComposeError::UnresolvedReference {
                kind: "service",
                name: service.to_string(),
                referenced_from: format!("{}#extends", file.display()),
            })?
            .clone();

        // Anchor include paths to the file that declares them before the
        // merge erases where each entry came from.
        if let Some(base) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            rebase_included_files(&mut child, base);
        }

        let extends = child.remove(Value::String("extends".into()));
        let merged = match extends {
            None => child,
            Some(decl) => {
                let (target, fragment_path) = parse_extends_decl(&decl, service)?;
                let parent = match fragment_path {
                    None => self.apply_extends(doc, file, &target, chain)?,
                    Some(relative) => {
                        let base = file.parent().unwrap_or_else(|| Path::new("."));
                        let path = base.join(relative);
                        let fragment = self.load_fragment(&path)?;
                        self.apply_extends(&fragment, &path, &target, chain)?
                    }
                };
                merge::merge_service(&parent, &child)
            }
        };

        let _ = chain.pop();
        Ok(merged)
    }

    /// Loads and interpolates a fragment document, caching per path.
    fn load_fragment(&mut self, path: &Path) -> Result<Mapping> {
        if let Some(cached) = self.fragments.get(path) {
            return Ok(cached.clone());
        }
        let mut root = loader::load_file(path)?;
        interpolate::apply(&mut root, self.opts).map_err(first_error)?;
        let fragment = root
            .as_mapping()
            .cloned()
            .ok_or_else(|| ComposeError::Schema {
                path: path.display().to_string(),
                reason: "extends fragment must be a mapping".into(),
            })?;
        let _ = self.fragments.insert(path.to_path_buf(), fragment.clone());
        Ok(fragment)
    }

    /// Folds `env_file` into `environment` and `label_file` into
    /// `labels`. Explicit entries keep precedence over file contents.
    fn fold_included_files(&self, mut service: Mapping) -> Result<Mapping> {
        for (file_key, value_key) in [("env_file", "environment"), ("label_file", "labels")] {
            let Some(files) = service.remove(Value::String(file_key.into())) else {
                continue;
            };
            let mut folded = Mapping::new();
            for path_text in scalar_or_list(&files) {
                let path = self.opts.working_dir.join(&path_text);
                for (key, value) in read_dotenv_file(&path)? {
                    let _ = folded.insert(Value::String(key), value);
                }
            }
            // Explicit entries win over file contents.
            if let Some(explicit) = get(&service, value_key) {
                for (key, value) in merge::keyed_entries(explicit) {
                    let _ = folded.insert(Value::String(key), value);
                }
            }
            let _ = service.insert(Value::String(value_key.into()), Value::Mapping(folded));
        }
        Ok(service)
    }

    /// Verifies every symbolic reference of one resolved service against
    /// the registry. First error wins.
    fn check_references(&self, name: &str, service: &Mapping) -> Result<()> {
        self.check_service_refs(
            name,
            "depends_on",
            &named_set_entries(get(service, "depends_on")),
        )?;

        for key in ["links", "external_links"] {
            let targets: Vec<String> = list_entries(get(service, key))
                .iter()
                .map(|entry| entry.split(':').next().unwrap_or(entry).to_string())
                .collect();
            self.check_service_refs(name, key, &targets)?;
        }

        let volumes_from: Vec<String> = list_entries(get(service, "volumes_from"))
            .iter()
            .filter(|entry| !entry.starts_with("container:"))
            .map(|entry| {
                entry
                    .strip_suffix(":ro")
                    .or_else(|| entry.strip_suffix(":rw"))
                    .unwrap_or(entry)
                    .to_string()
            })
            .collect();
        self.check_service_refs(name, "volumes_from", &volumes_from)?;

        if let Some(mode) = get(service, "network_mode").and_then(scalar_to_string) {
            if let Some(target) = mode.strip_prefix("service:") {
                if self.registry.service_id(target).is_none() {
                    return Err(unresolved(
                        "service",
                        target,
                        &format!("services.{name}.network_mode"),
                    ));
                }
            }
        }

        for network in named_set_entries(get(service, "networks")) {
            if self.registry.network_id(&network).is_none() {
                return Err(unresolved(
                    "network",
                    &network,
                    &format!("services.{name}.networks"),
                ));
            }
        }

        for (idx, entry) in mount_entries(get(service, "volumes")).iter().enumerate() {
            if let Some(volume) = entry {
                if self.registry.volume_id(volume).is_none() {
                    return Err(unresolved(
                        "volume",
                        volume,
                        &format!("services.{name}.volumes.{idx}"),
                    ));
                }
            }
        }

        for (key, kind) in [("configs", "config"), ("secrets", "secret")] {
            for source in grant_sources(get(service, key)) {
                let declared = match kind {
                    "config" => self.registry.config_id(&source).is_some(),
                    _ => self.registry.secret_id(&source).is_some(),
                };
                if !declared {
                    return Err(unresolved(kind, &source, &format!("services.{name}.{key}")));
                }
            }
        }

        Ok(())
    }

    fn check_service_refs(&self, name: &str, key: &str, targets: &[String]) -> Result<()> {
        for target in targets {
            if self.registry.service_id(target).is_none() {
                return Err(unresolved(
                    "service",
                    target,
                    &format!("services.{name}.{key}"),
                ));
            }
        }
        Ok(())
    }

    /// Top-level configs and secrets naming an inline file must point at
    /// an existing file.
    fn check_declared_files(&self, doc: &Mapping, errors: &mut ErrorSet) {
        for section in ["configs", "secrets"] {
            let Some(entries) = get(doc, section).and_then(Value::as_mapping) else {
                continue;
            };
            for (_key, body) in entries {
                let Some(file) = body
                    .as_mapping()
                    .and_then(|map| get(map, "file"))
                    .and_then(scalar_to_string)
                else {
                    continue;
                };
                let path = self.opts.working_dir.join(&file);
                if !path.is_file() {
                    errors.push(ComposeError::MissingFile { path });
                }
            }
        }
    }
}

/// Rewrites relative `env_file`/`label_file` entries of a service
/// definition against `base`, the directory of the file declaring them.
/// A fragment pulled in via `extends` from a subdirectory keeps its
/// includes next to the fragment, not next to the root document.
fn rebase_included_files(service: &mut Mapping, base: &Path) {
    for key in ["env_file", "label_file"] {
        let Some(value) = service.get_mut(Value::String(key.into())) else {
            continue;
        };
        let rebased: Vec<Value> = scalar_or_list(value)
            .into_iter()
            .map(|entry| Value::String(base.join(entry).display().to_string()))
            .collect();
        *value = Value::Sequence(rebased);
    }
}

/// Finds a service definition within a document: under `services`, or at
/// the top level for legacy fragment files.
fn fragment_service<'a>(doc: &'a Mapping, name: &str) -> Option<&'a Mapping> {
    let from_section = get(doc, "services")
        .and_then(Value::as_mapping)
        .and_then(|services| get(services, name))
        .and_then(Value::as_mapping);
    from_section.or_else(|| get(doc, name).and_then(Value::as_mapping))
}

fn parse_extends_decl(decl: &Value, child: &str) -> Result<(String, Option<String>)> {
    if let Some(target) = scalar_to_string(decl) {
        return Ok((target, None));
    }
    let map = decl.as_mapping().ok_or_else(|| ComposeError::Schema {
        path: format!("services.{child}.extends"),
        reason: "expected a string or a mapping".into(),
    })?;
    let target = get(map, "service")
        .and_then(scalar_to_string)
        .ok_or_else(|| ComposeError::Schema {
            path: format!("services.{child}.extends"),
            reason: "a service key is required".into(),
        })?;
    Ok((target, get(map, "file").and_then(scalar_to_string)))
}

fn render_chain(chain: &[(PathBuf, String)]) -> String {
    chain
        .iter()
        .map(|(file, service)| format!("{}#{}", file.display(), service))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Parses one `KEY=value` per line, skipping blanks and `#` comments.
/// A bare `KEY` line yields a null value, filled from the caller's
/// variable set at emission.
fn read_dotenv_file(path: &Path) -> Result<Vec<(String, Value)>> {
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

    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                    .unwrap_or(value);
                entries.push((key.trim().to_string(), Value::String(value.to_string())));
            }
            None => entries.push((line.to_string(), Value::Null)),
        }
    }
    Ok(entries)
}

fn scalar_or_list(value: &Value) -> Vec<String> {
    scalar_to_string(value).map_or_else(|| list_entries(Some(value)), |single| vec![single])
}

fn list_entries(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_sequence)
        .map(|items| items.iter().filter_map(scalar_to_string).collect())
        .unwrap_or_default()
}

/// Names from a `depends_on`/`networks` value in either list or mapping
/// form.
fn named_set_entries(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(Value::Mapping(map)) => map.keys().filter_map(scalar_to_string).collect(),
        _ => Vec::new(),
    }
}

/// The named-volume source of each `volumes` entry, or `None` for bind
/// mounts and anonymous volumes.
fn mount_entries(value: Option<&Value>) -> Vec<Option<String>> {
    let Some(items) = value.and_then(Value::as_sequence) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|entry| match entry {
            Value::Mapping(map) => {
                let is_volume = get(map, "type")
                    .and_then(scalar_to_string)
                    .is_none_or(|t| t == "volume");
                if is_volume {
                    get(map, "source").and_then(scalar_to_string)
                } else {
                    None
                }
            }
            _ => scalar_to_string(entry).and_then(|text| named_volume_source(&text)),
        })
        .collect()
}

/// Extracts the named-volume source from short mount syntax, if the
/// source is a volume name rather than a host path.
pub(crate) fn named_volume_source(text: &str) -> Option<String> {
    let mut parts = text.splitn(3, ':');
    let first = parts.next()?;
    // A single segment is an anonymous volume target.
    parts.next()?;
    if is_host_path(first) {
        None
    } else {
        Some(first.to_string())
    }
}

/// Heuristic shared with the emitter: mount sources that look like paths
/// are bind mounts, everything else names a top-level volume.
pub(crate) fn is_host_path(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.') || source.starts_with('~')
}

/// Sources referenced by a service `configs`/`secrets` list, in both
/// short and long form.
fn grant_sources(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_sequence) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|entry| match entry {
            Value::Mapping(map) => get(map, "source").and_then(scalar_to_string),
            _ => scalar_to_string(entry),
        })
        .collect()
}

fn unresolved(kind: &'static str, name: &str, referenced_from: &str) -> ComposeError {
    ComposeError::UnresolvedReference {
        kind,
        name: name.to_string(),
        referenced_from: referenced_from.to_string(),
    }
}

fn first_error(errors: ErrorSet) -> ComposeError {
    errors
        .into_iter()
        .next()
        .unwrap_or_else(|| ComposeError::Syntax {
            message: "unknown interpolation failure".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Mapping {
        serde_yaml::from_str(text).expect("fixture should parse")
    }

    fn opts() -> ResolveOptions {
        ResolveOptions::new(PathBuf::from("."), BTreeMap::new())
    }

    fn resolve(text: &str) -> std::result::Result<BTreeMap<String, Mapping>, ErrorSet> {
        let d = doc(text);
        let registry = Registry::from_document(&d);
        let opts = opts();
        let mut resolver = Resolver::new(&opts, &registry);
        resolver.resolve_services(&d, Path::new("compose.yaml"))
    }

    #[test]
    fn registry_preserves_declaration_order() {
        let d = doc("services:\n  b: {image: x}\n  a: {image: y}\nvolumes:\n  data: null\n");
        let registry = Registry::from_document(&d);
        assert_eq!(registry.services(), &["b".to_string(), "a".to_string()]);
        assert_eq!(registry.service_id("a"), Some(ServiceId(1)));
        assert!(registry.volume_id("data").is_some());
        assert!(registry.volume_id("ghost").is_none());
    }

    #[test]
    fn undeclared_dependency_is_unresolved() {
        let err = resolve("services:\n  web:\n    image: nginx\n    depends_on:\n    - ghost\n")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\"ghost\""), "got: {msg}");
        assert!(msg.contains("services.web.depends_on"), "got: {msg}");
    }

    #[test]
    fn undeclared_named_volume_is_unresolved() {
        let err = resolve(
            "services:\n  db:\n    image: postgres\n    volumes:\n    - pgdata:/var/lib/postgresql/data\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("\"pgdata\""), "got: {err}");
    }

    #[test]
    fn declared_named_volume_resolves() {
        let resolved = resolve(
            "services:\n  db:\n    image: postgres\n    volumes:\n    - pgdata:/var/lib/postgresql/data\nvolumes:\n  pgdata: null\n",
        )
        .expect("should resolve");
        assert!(resolved.contains_key("db"));
    }

    #[test]
    fn bind_mounts_do_not_need_declarations() {
        let resolved = resolve(
            "services:\n  web:\n    image: nginx\n    volumes:\n    - ./site:/usr/share/nginx/html:ro\n",
        )
        .expect("should resolve");
        assert!(resolved.contains_key("web"));
    }

    #[test]
    fn same_file_extends_merges_parent_fields() {
        let resolved = resolve(
            "services:\n  base:\n    image: app:1\n    restart: always\n  web:\n    extends:\n      service: base\n    restart: unless-stopped\n",
        )
        .expect("should resolve");
        let web = &resolved["web"];
        assert_eq!(
            get(web, "restart").and_then(scalar_to_string),
            Some("unless-stopped".into())
        );
        assert_eq!(
            get(web, "image").and_then(scalar_to_string),
            Some("app:1".into())
        );
        assert!(get(web, "extends").is_none());
    }

    #[test]
    fn same_file_extends_cycle_is_detected() {
        let err = resolve(
            "services:\n  a:\n    extends:\n      service: b\n  b:\n    extends:\n      service: a\n",
        )
        .unwrap_err();
        let has_cycle = err
            .errors()
            .iter()
            .any(|e| matches!(e, ComposeError::CyclicExtends { .. }));
        assert!(has_cycle, "got: {err}");
        assert!(err.to_string().contains("compose.yaml#a"), "got: {err}");
    }

    #[test]
    fn self_extends_is_a_cycle() {
        let err = resolve("services:\n  a:\n    extends:\n      service: a\n").unwrap_err();
        assert!(err.to_string().contains("cyclic extends"), "got: {err}");
    }

    #[test]
    fn extends_unknown_service_is_unresolved() {
        let err =
            resolve("services:\n  web:\n    extends:\n      service: missing\n").unwrap_err();
        assert!(err.to_string().contains("\"missing\""), "got: {err}");
    }

    #[test]
    fn missing_env_file_carries_exact_path() {
        let err = resolve(
            "services:\n  web:\n    image: nginx\n    env_file: nope/absent.env\n",
        )
        .unwrap_err();
        let missing = err
            .errors()
            .iter()
            .find_map(|e| match e {
                ComposeError::MissingFile { path } => Some(path.clone()),
                _ => None,
            })
            .expect("expected a MissingFile error");
        assert!(missing.ends_with("nope/absent.env"), "got: {missing:?}");
    }

    #[test]
    fn env_file_folds_with_explicit_environment_winning() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("app.env"),
            "# comment\nDB_HOST=db\nLOG_LEVEL=warn\n\nQUOTED=\"hello world\"\n",
        )
        .expect("write env file");
        let d = doc(
            "services:\n  web:\n    image: nginx\n    env_file: app.env\n    environment:\n      LOG_LEVEL: debug\n",
        );
        let registry = Registry::from_document(&d);
        let opts = ResolveOptions::new(dir.path().to_path_buf(), BTreeMap::new());
        let mut resolver = Resolver::new(&opts, &registry);
        let resolved = resolver
            .resolve_services(&d, &dir.path().join("compose.yaml"))
            .expect("should resolve");

        let env = get(&resolved["web"], "environment")
            .and_then(Value::as_mapping)
            .expect("environment mapping");
        assert_eq!(
            get(env, "LOG_LEVEL").and_then(scalar_to_string),
            Some("debug".into())
        );
        assert_eq!(
            get(env, "DB_HOST").and_then(scalar_to_string),
            Some("db".into())
        );
        assert_eq!(
            get(env, "QUOTED").and_then(scalar_to_string),
            Some("hello world".into())
        );
        assert!(get(&resolved["web"], "env_file").is_none());
    }

    #[test]
    fn extends_from_file_and_cycle_across_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("base.yaml"),
            "services:\n  common:\n    image: base:1\n    environment:\n      LOG_LEVEL: warn\n",
        )
        .expect("write base");
        let d = doc(
            "services:\n  web:\n    extends:\n      service: common\n      file: base.yaml\n    environment:\n      LOG_LEVEL: debug\n",
        );
        let registry = Registry::from_document(&d);
        let opts = ResolveOptions::new(dir.path().to_path_buf(), BTreeMap::new());
        let mut resolver = Resolver::new(&opts, &registry);
        let resolved = resolver
            .resolve_services(&d, &dir.path().join("compose.yaml"))
            .expect("should resolve");
        let web = &resolved["web"];
        assert_eq!(
            get(web, "image").and_then(scalar_to_string),
            Some("base:1".into())
        );
        let env = get(web, "environment")
            .and_then(Value::as_mapping)
            .expect("environment");
        assert_eq!(
            get(env, "LOG_LEVEL").and_then(scalar_to_string),
            Some("debug".into())
        );
    }

    #[test]
    fn cross_file_extends_cycle_reports_full_chain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.yaml");
        let b = dir.path().join("b.yaml");
        std::fs::write(
            &a,
            "services:\n  first:\n    extends:\n      service: second\n      file: b.yaml\n",
        )
        .expect("write a");
        std::fs::write(
            &b,
            "services:\n  second:\n    extends:\n      service: first\n      file: a.yaml\n",
        )
        .expect("write b");

        let d: Mapping = serde_yaml::from_str(
            &std::fs::read_to_string(&a).expect("read a"),
        )
        .expect("parse a");
        let registry = Registry::from_document(&d);
        let opts = ResolveOptions::new(dir.path().to_path_buf(), BTreeMap::new());
        let mut resolver = Resolver::new(&opts, &registry);
        let err = resolver.resolve_services(&d, &a).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cyclic extends"), "got: {msg}");
        assert!(msg.contains("first"), "got: {msg}");
        assert!(msg.contains("second"), "got: {msg}");
    }

    #[test]
    fn fragment_env_file_resolves_against_fragment_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("shared")).expect("mkdir");
        std::fs::write(
            dir.path().join("shared").join("base.yaml"),
            "services:\n  common:\n    image: base:1\n    env_file: common.env\n",
        )
        .expect("write fragment");
        std::fs::write(dir.path().join("shared").join("common.env"), "DB_HOST=db\n")
            .expect("write env file");
        let d = doc(
            "services:\n  web:\n    extends:\n      service: common\n      file: shared/base.yaml\n",
        );
        let registry = Registry::from_document(&d);
        let opts = ResolveOptions::new(dir.path().to_path_buf(), BTreeMap::new());
        let mut resolver = Resolver::new(&opts, &registry);
        let resolved = resolver
            .resolve_services(&d, &dir.path().join("compose.yaml"))
            .expect("should resolve");

        let env = get(&resolved["web"], "environment")
            .and_then(Value::as_mapping)
            .expect("environment mapping");
        assert_eq!(
            get(env, "DB_HOST").and_then(scalar_to_string),
            Some("db".into())
        );
    }

    #[test]
    fn extends_missing_file_is_reported() {
        let err = resolve(
            "services:\n  web:\n    extends:\n      service: base\n      file: absent.yaml\n",
        )
        .unwrap_err();
        let has_missing = err
            .errors()
            .iter()
            .any(|e| matches!(e, ComposeError::MissingFile { .. }));
        assert!(has_missing, "got: {err}");
    }

    #[test]
    fn errors_collected_across_independent_services() {
        let err = resolve(
            "services:\n  a:\n    image: x\n    depends_on: [ghost1]\n  b:\n    image: y\n    depends_on: [ghost2]\n  c:\n    image: z\n",
        )
        .unwrap_err();
        assert_eq!(err.len(), 2, "got: {err}");
    }

    #[test]
    fn dotenv_parsing_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vars.env");
        std::fs::write(&path, "# header\n\nA=1\n  B = 2 \nBARE\n").expect("write");
        let entries = read_dotenv_file(&path).expect("should parse");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "A");
        assert_eq!(entries[1].0, "B");
        assert_eq!(entries[1].1.as_str(), Some("2"));
        assert_eq!(entries[2].0, "BARE");
        assert!(entries[2].1.is_null());
    }

    #[test]
    fn undeclared_network_attachment_is_unresolved() {
        let err = resolve(
            "services:\n  web:\n    image: nginx\n    networks:\n    - backend\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("\"backend\""), "got: {err}");
    }

    #[test]
    fn undeclared_config_grant_is_unresolved() {
        let err = resolve(
            "services:\n  web:\n    image: nginx\n    configs:\n    - app_cfg\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("\"app_cfg\""), "got: {err}");
    }
}
