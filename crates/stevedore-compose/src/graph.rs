//! Service dependency ordering using `petgraph`.
//!
//! Builds a directed graph from `depends_on`, `links`, and `volumes_from`
//! and resolves a start order in which every service comes after the
//! services it needs.

use std::collections::BTreeMap;

use petgraph::graph::NodeIndex;
use stevedore_common::error::{ComposeError, Result};

use crate::config::{ServiceConfig, ServiceConfigs};

/// A dependency graph of services.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: petgraph::Graph<String, ()>,
    nodes: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph of a set of services.
    ///
    /// References to services outside `services`, and `container:`
    /// references in `volumes_from`, are ignored.
    #[must_use]
    pub fn from_services(services: &ServiceConfigs) -> Self {
        let mut graph = Self::new();
        for name in services.keys() {
            let _ = graph.add_service(name);
        }
        for (name, config) in services.iter() {
            for dependency in dependencies(config) {
                if services.contains(dependency) && dependency != name {
                    graph.add_dependency(name, dependency);
                }
            }
        }
        graph
    }

    /// Adds a service node, returning the existing node if already present.
    pub fn add_service(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_owned());
        let _ = self.nodes.insert(name.to_owned(), idx);
        idx
    }

    /// Records that `dependent` needs `dependency` to be started first.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        let from = self.add_service(dependency);
        let to = self.add_service(dependent);
        let _ = self.graph.update_edge(from, to, ());
    }

    /// Returns service names with dependencies first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming a service on a cycle.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => {
                let service = self
                    .graph
                    .node_weight(cycle.node_id())
                    .map_or("<unknown>", String::as_str);
                Err(ComposeError::Config {
                    message: format!("cyclic dependency detected involving service \"{service}\""),
                })
            }
        }
    }
}

/// Names of the services `config` refers to.
fn dependencies(config: &ServiceConfig) -> impl Iterator<Item = &str> {
    let depends_on = config.depends_on.iter().map(String::as_str);
    let links = config
        .links
        .iter()
        .map(|link| link.split_once(':').map_or(link.as_str(), |(name, _)| name));
    let volumes_from = config
        .volumes_from
        .iter()
        .filter(|source| !source.starts_with("container:"))
        .map(|source| {
            let source = source.strip_prefix("service:").unwrap_or(source);
            source.split_once(':').map_or(source, |(name, _)| name)
        });
    depends_on.chain(links).chain(volumes_from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services(input: &str) -> ServiceConfigs {
        let map: BTreeMap<String, ServiceConfig> =
            serde_yaml::from_str(input).expect("should deserialize");
        map.into()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).expect(name)
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let order = DependencyGraph::new().resolve_order().expect("should resolve");
        assert!(order.is_empty());
    }

    #[test]
    fn depends_on_orders_dependencies_first() {
        let graph = DependencyGraph::from_services(&services(
            "web:\n  depends_on: [db]\ndb:\n  image: postgres",
        ));
        let order = graph.resolve_order().expect("should resolve");
        assert!(position(&order, "db") < position(&order, "web"), "{order:?}");
    }

    #[test]
    fn links_and_volumes_from_are_edges() {
        let graph = DependencyGraph::from_services(&services(
            "app:\n  links: [cache:redis]\n  volumes_from: [\"data:ro\", \"container:other\"]\ncache: {}\ndata: {}",
        ));
        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order.len(), 3);
        assert!(position(&order, "cache") < position(&order, "app"));
        assert!(position(&order, "data") < position(&order, "app"));
    }

    #[test]
    fn unknown_services_are_ignored() {
        let graph = DependencyGraph::from_services(&services("web:\n  links: [external]"));
        assert_eq!(graph.resolve_order().expect("should resolve"), vec!["web"]);
    }

    #[test]
    fn diamond_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "c");
        graph.add_dependency("b", "d");
        graph.add_dependency("c", "d");

        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order.len(), 4);
        assert!(position(&order, "d") < position(&order, "b"));
        assert!(position(&order, "d") < position(&order, "c"));
        assert!(position(&order, "b") < position(&order, "a"));
        assert!(position(&order, "c") < position(&order, "a"));
    }

    #[test]
    fn cycle_detection() {
        let graph = DependencyGraph::from_services(&services(
            "a:\n  depends_on: [b]\nb:\n  links: [a]",
        ));
        let msg = graph.resolve_order().unwrap_err().to_string();
        assert!(msg.contains("cyclic"), "got: {msg}");
    }

    #[test]
    fn duplicate_edges_are_collapsed() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("web", "db");
        graph.add_dependency("web", "db");
        assert_eq!(graph.resolve_order().expect("should resolve").len(), 2);
    }
}
