//! Project dependency ordering
//!
//! Handles computing build order over the workspace's project graph and
//! detecting dependency cycles before anything is queued.

use std::collections::{HashMap, HashSet};

use crate::error::GraphError;

/// Dependency graph for projects
///
/// Nodes keep their insertion order, which makes every ordering method
/// deterministic: independent projects come out in the order they were
/// requested.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Adjacency list: project -> direct dependencies, in declaration order
    edges: HashMap<String, Vec<String>>,
    /// All known projects, in insertion order
    nodes: Vec<String>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a project and its direct dependencies
    ///
    /// Dependencies that were never added themselves become leaf nodes.
    pub fn add_project(&mut self, name: &str, dependencies: Vec<String>) {
        self.insert_node(name);
        for dependency in &dependencies {
            self.insert_node(dependency);
        }
        self.edges.insert(name.to_string(), dependencies);
    }

    fn insert_node(&mut self, name: &str) {
        if !self.nodes.iter().any(|node| node == name) {
            self.nodes.push(name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|node| node == name)
    }

    /// `requested` plus every transitive dependency, dependencies first
    ///
    /// Requested projects are visited in the order given, so independent
    /// projects keep their submission order.
    pub fn closure_order(&self, requested: &[&str]) -> Result<Vec<String>, GraphError> {
        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();
        let mut result = Vec::new();
        let mut cycle_path = Vec::new();

        for node in requested {
            if !self.contains(node) {
                return Err(GraphError::UnknownProject {
                    name: (*node).to_string(),
                });
            }
            if !visited.contains(*node) {
                self.visit(
                    node,
                    &mut visited,
                    &mut temp_visited,
                    &mut result,
                    &mut cycle_path,
                )?;
            }
        }

        Ok(result)
    }

    /// Order `requested` so dependencies come before dependents
    ///
    /// Projects outside `requested` only contribute ordering constraints;
    /// they do not appear in the result.
    pub fn dependency_order(&self, requested: &[&str]) -> Result<Vec<String>, GraphError> {
        let wanted: HashSet<&str> = requested.iter().copied().collect();
        Ok(self
            .closure_order(requested)?
            .into_iter()
            .filter(|name| wanted.contains(name.as_str()))
            .collect())
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
        cycle_path: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if temp_visited.contains(node) {
            // Found a cycle
            cycle_path.push(node.to_string());
            return Err(GraphError::CircularDependency {
                cycle: cycle_path.clone(),
            });
        }

        if visited.contains(node) {
            return Ok(());
        }

        temp_visited.insert(node.to_string());
        cycle_path.push(node.to_string());

        if let Some(dependencies) = self.edges.get(node) {
            for dependency in dependencies {
                self.visit(dependency, visited, temp_visited, result, cycle_path)?;
            }
        }

        cycle_path.pop();
        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());

        Ok(())
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        let all: Vec<&str> = self.nodes.iter().map(String::as_str).collect();
        self.closure_order(&all).is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_come_before_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add_project("app", vec!["lib".to_string()]);
        graph.add_project("lib", vec![]);

        let order = graph.closure_order(&["app"]).unwrap();
        assert_eq!(order, vec!["lib", "app"]);
    }

    #[test]
    fn test_independent_projects_keep_submission_order() {
        let mut graph = DependencyGraph::new();
        graph.add_project("zeta", vec![]);
        graph.add_project("alpha", vec![]);
        graph.add_project("mid", vec![]);

        let order = graph.closure_order(&["mid", "zeta", "alpha"]).unwrap();
        assert_eq!(order, vec!["mid", "zeta", "alpha"]);
    }

    #[test]
    fn test_shared_dependency_is_emitted_once() {
        let mut graph = DependencyGraph::new();
        graph.add_project("a", vec!["common".to_string()]);
        graph.add_project("b", vec!["common".to_string()]);
        graph.add_project("common", vec![]);

        let order = graph.closure_order(&["a", "b"]).unwrap();
        assert_eq!(order, vec!["common", "a", "b"]);
    }

    #[test]
    fn test_dependency_order_keeps_only_requested_projects() {
        let mut graph = DependencyGraph::new();
        graph.add_project("app", vec!["lib".to_string()]);
        graph.add_project("lib", vec!["base".to_string()]);
        graph.add_project("base", vec![]);

        let order = graph.dependency_order(&["app", "lib"]).unwrap();
        assert_eq!(order, vec!["lib", "app"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let mut graph = DependencyGraph::new();
        graph.add_project("a", vec!["b".to_string()]);
        graph.add_project("b", vec!["c".to_string()]);
        graph.add_project("c", vec!["a".to_string()]);

        assert!(graph.has_cycle());
        let error = graph.closure_order(&["a"]).unwrap_err();
        let GraphError::CircularDependency { cycle } = error else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_unknown_project_is_rejected() {
        let graph = DependencyGraph::new();
        let error = graph.closure_order(&["ghost"]).unwrap_err();
        assert!(matches!(error, GraphError::UnknownProject { .. }));
    }
}
