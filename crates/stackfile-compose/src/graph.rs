//! Service dependency graph built on `petgraph`.
//!
//! Builds a directed graph from `depends_on` edges and resolves the
//! topological startup order for the external runtime.

use stackfile_common::error::{ComposeError, Result};

use crate::model::{Project, ServiceId};

/// A dependency graph over the services of one project.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: petgraph::Graph<ServiceId, ()>,
}

impl DependencyGraph {
    /// Builds the graph from a resolved project.
    #[must_use]
    pub fn from_project(project: &Project) -> Self {
        let mut graph = petgraph::Graph::new();
        let nodes: Vec<_> = (0..project.services.len())
            .map(|idx| graph.add_node(ServiceId(idx)))
            .collect();

        for (idx, service) in project.services.iter().enumerate() {
            for dep in &service.depends_on {
                // Edge points from dependency to dependent so that
                // topological sort yields dependencies first.
                let _ = graph.add_edge(nodes[dep.service.0], nodes[idx], ());
            }
        }

        Self { graph }
    }

    /// Returns services in startup order: dependencies before the
    /// services that depend on them.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::DependencyCycle`] rendering the full cycle
    /// when `depends_on` edges loop.
    pub fn startup_order(&self, project: &Project) -> Result<Vec<ServiceId>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&idx| self.graph.node_weight(idx).copied())
                .collect()),
            Err(cycle) => {
                // Toposort only reports one node on the cycle; the
                // strongly connected component holds the rest.
                let start = cycle.node_id();
                let component = petgraph::algo::tarjan_scc(&self.graph)
                    .into_iter()
                    .find(|component| component.contains(&start))
                    .unwrap_or_else(|| vec![start]);
                let mut names: Vec<&str> = component
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .map(|id| project.service(*id).name.as_str())
                    .collect();
                if let Some(&first) = names.first() {
                    names.push(first);
                }
                Err(ComposeError::DependencyCycle {
                    chain: names.join(" -> "),
                })
            }
        }
    }
}

/// Convenience wrapper used by [`Project::startup_order`].
pub(crate) fn startup_order(project: &Project) -> Result<Vec<ServiceId>> {
    DependencyGraph::from_project(project).startup_order(project)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use stackfile_common::types::{DependencyCondition, ResourceLimits, RestartPolicy};

    use super::*;
    use crate::model::{Dependency, NetworkingMode, Service};

    fn service(name: &str, deps: &[usize]) -> Service {
        Service {
            name: name.into(),
            image: Some("img".into()),
            build: None,
            command: None,
            entrypoint: None,
            environment: BTreeMap::new(),
            labels: BTreeMap::new(),
            depends_on: deps
                .iter()
                .map(|&idx| Dependency {
                    service: ServiceId(idx),
                    condition: DependencyCondition::default(),
                    restart: false,
                    required: true,
                })
                .collect(),
            links: Vec::new(),
            mounts: Vec::new(),
            volumes_from: Vec::new(),
            networking: NetworkingMode::Bridge {
                attachments: Vec::new(),
                ports: Vec::new(),
                expose: Vec::new(),
            },
            limits: ResourceLimits::default(),
            restart: RestartPolicy::default(),
            configs: Vec::new(),
            secrets: Vec::new(),
            healthcheck: None,
            user: None,
            working_dir: None,
            hostname: None,
        }
    }

    fn project(services: Vec<Service>) -> Project {
        Project {
            name: "test".into(),
            services,
            networks: Vec::new(),
            volumes: Vec::new(),
            configs: Vec::new(),
            secrets: Vec::new(),
        }
    }

    #[test]
    fn empty_project_has_empty_order() {
        let p = project(Vec::new());
        assert!(p.startup_order().expect("should resolve").is_empty());
    }

    #[test]
    fn dependencies_come_first() {
        // api (0) depends on db (1) and cache (2).
        let p = project(vec![
            service("api", &[1, 2]),
            service("db", &[]),
            service("cache", &[]),
        ]);
        let order = p.startup_order().expect("should resolve");
        let pos = |name: &str| {
            order
                .iter()
                .position(|&id| p.service(id).name == name)
                .expect(name)
        };
        assert!(pos("db") < pos("api"));
        assert!(pos("cache") < pos("api"));
    }

    #[test]
    fn diamond_orders_all_four() {
        // a depends on b and c; b and c depend on d.
        let p = project(vec![
            service("a", &[1, 2]),
            service("b", &[3]),
            service("c", &[3]),
            service("d", &[]),
        ]);
        let order = p.startup_order().expect("should resolve");
        assert_eq!(order.len(), 4);
        assert_eq!(p.service(order[0]).name, "d");
        assert_eq!(p.service(order[3]).name, "a");
    }

    #[test]
    fn cycle_is_reported() {
        let p = project(vec![service("a", &[1]), service("b", &[0])]);
        let err = p.startup_order().unwrap_err();
        assert!(matches!(err, ComposeError::DependencyCycle { .. }), "got: {err}");
    }

    #[test]
    fn cycle_chain_names_every_member() {
        // a -> b -> c -> a, with d off to the side.
        let p = project(vec![
            service("a", &[1]),
            service("b", &[2]),
            service("c", &[0]),
            service("d", &[]),
        ]);
        let err = p.startup_order().unwrap_err();
        let chain = match err {
            ComposeError::DependencyCycle { chain } => chain,
            other => panic!("expected DependencyCycle, got {other}"),
        };
        for name in ["a", "b", "c"] {
            assert!(chain.contains(name), "got: {chain}");
        }
        assert!(!chain.contains('d'), "got: {chain}");
        assert!(chain.contains(" -> "), "got: {chain}");
        // The chain loops back to where it started.
        let first = chain.split(" -> ").next().expect("non-empty chain");
        assert!(chain.ends_with(first), "got: {chain}");
    }
}
