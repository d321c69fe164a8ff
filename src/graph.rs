//! Dependency graph between stack resources.
//!
//! Edges run from a resource to the resources it references. Creation order
//! visits dependencies first; destruction order is the reverse. Ties are
//! broken by address so plans are deterministic.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ConfigError, Result, SgwError};
use crate::model::{ResourceAddress, Stack};

/// Directed graph of resource dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Dependencies of each node.
    edges: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph of a stack from its reference fields.
    #[must_use]
    pub fn from_stack(stack: &Stack) -> Self {
        let mut graph = Self::new();
        for resource in &stack.resources {
            graph.add_node(resource.address(), resource.references());
        }
        graph
    }

    /// Adds a node with its dependencies. Dependencies are added as nodes.
    pub fn add_node(&mut self, node: ResourceAddress, dependencies: impl IntoIterator<Item = ResourceAddress>) {
        let deps: BTreeSet<ResourceAddress> = dependencies.into_iter().collect();
        for dep in &deps {
            self.edges.entry(dep.clone()).or_default();
        }
        self.edges.entry(node).or_default().extend(deps);
    }

    /// Returns true if the graph contains the node.
    #[must_use]
    pub fn contains(&self, node: &ResourceAddress) -> bool {
        self.edges.contains_key(node)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Returns the direct dependencies of a node.
    #[must_use]
    pub fn dependencies_of(&self, node: &ResourceAddress) -> Vec<ResourceAddress> {
        self.edges
            .get(node)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the nodes that directly depend on `node`.
    #[must_use]
    pub fn dependents_of(&self, node: &ResourceAddress) -> Vec<ResourceAddress> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(node))
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Returns `node` and everything that transitively depends on it.
    #[must_use]
    pub fn dependent_closure(&self, node: &ResourceAddress) -> BTreeSet<ResourceAddress> {
        let mut closure = BTreeSet::new();
        let mut pending = vec![node.clone()];

        while let Some(current) = pending.pop() {
            if closure.insert(current.clone()) {
                pending.extend(self.dependents_of(&current));
            }
        }

        closure
    }

    /// Returns every node with its dependencies first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CircularDependency`] if the graph has a cycle.
    pub fn creation_order(&self) -> Result<Vec<ResourceAddress>> {
        let mut result = Vec::with_capacity(self.edges.len());
        let mut visited = BTreeSet::new();
        let mut in_progress = Vec::new();

        for node in self.edges.keys() {
            self.visit(node, &mut visited, &mut in_progress, &mut result)?;
        }

        Ok(result)
    }

    /// Returns every node with its dependents first.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph has a cycle.
    pub fn destruction_order(&self) -> Result<Vec<ResourceAddress>> {
        let mut order = self.creation_order()?;
        order.reverse();
        Ok(order)
    }

    fn visit(
        &self,
        node: &ResourceAddress,
        visited: &mut BTreeSet<ResourceAddress>,
        in_progress: &mut Vec<ResourceAddress>,
        result: &mut Vec<ResourceAddress>,
    ) -> Result<()> {
        if visited.contains(node) {
            return Ok(());
        }

        if let Some(start) = in_progress.iter().position(|n| n == node) {
            let cycle: Vec<String> = in_progress[start..]
                .iter()
                .chain(std::iter::once(node))
                .map(ToString::to_string)
                .collect();
            return Err(SgwError::Config(ConfigError::CircularDependency {
                cycle: cycle.join(" -> "),
            }));
        }

        in_progress.push(node.clone());
        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                self.visit(dep, visited, in_progress, result)?;
            }
        }
        in_progress.pop();

        visited.insert(node.clone());
        result.push(node.clone());
        Ok(())
    }

    /// Iterates over `(node, dependencies)` pairs in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceAddress, &BTreeSet<ResourceAddress>)> {
        self.edges.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> ResourceAddress {
        ResourceAddress::topic("storage-gateway-health-alerts")
    }

    fn sample() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_node(ResourceAddress::alarm("storage-gateway-health"), [topic()]);
        graph.add_node(ResourceAddress::policy("publish"), [topic()]);
        graph
    }

    #[test]
    fn test_creation_order_puts_topic_first() {
        let order = sample().creation_order().unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], topic());
        assert_eq!(order[1], ResourceAddress::policy("publish"));
        assert_eq!(order[2], ResourceAddress::alarm("storage-gateway-health"));
    }

    #[test]
    fn test_destruction_order_puts_topic_last() {
        let order = sample().destruction_order().unwrap();
        assert_eq!(order.last(), Some(&topic()));
    }

    #[test]
    fn test_dependents() {
        let graph = sample();
        let dependents = graph.dependents_of(&topic());
        assert_eq!(dependents.len(), 2);
        assert!(graph.dependents_of(&ResourceAddress::policy("publish")).is_empty());
        assert_eq!(graph.dependent_closure(&topic()).len(), 3);
    }

    #[test]
    fn test_cycle_detected() {
        let a = ResourceAddress::topic("a");
        let b = ResourceAddress::topic("b");
        let mut graph = DependencyGraph::new();
        graph.add_node(a.clone(), [b.clone()]);
        graph.add_node(b, [a]);

        let err = graph.creation_order().unwrap_err();
        assert!(matches!(err, SgwError::Config(ConfigError::CircularDependency { .. })));
    }
}
