//! Resource dependency graph
//!
//! Edges point from a dependency to its dependent, so a topological walk
//! yields creation order and its reverse yields deletion order.

use crate::resource::Node;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use pushkey_core::{Error, Result};
use std::collections::HashMap;

/// Directed acyclic graph over the managed resources
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    graph: DiGraphMap<Node, ()>,
}

impl ResourceGraph {
    /// Graph of every managed node and its declared dependencies
    pub fn new() -> Self {
        Self::from_nodes(&Node::ALL)
    }

    /// Graph restricted to `nodes`; edges to nodes outside the set are dropped
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut graph = DiGraphMap::new();
        for node in nodes {
            graph.add_node(*node);
        }
        for node in nodes {
            for dep in node.dependencies() {
                if graph.contains_node(*dep) {
                    graph.add_edge(*dep, *node, ());
                }
            }
        }
        Self { graph }
    }

    /// Creation order
    ///
    /// Nodes are grouped by depth from the roots and ordered by declaration
    /// within a depth, so the order is stable across runs.
    pub fn topological_order(&self) -> Result<Vec<Node>> {
        let mut order =
            toposort(&self.graph, None).map_err(|cycle| Error::CircularDependency {
                node: cycle.node_id().to_string(),
            })?;

        let mut depth: HashMap<Node, usize> = HashMap::new();
        for node in &order {
            let d = self
                .graph
                .neighbors_directed(*node, Direction::Incoming)
                .filter_map(|parent| depth.get(&parent).map(|d| d + 1))
                .max()
                .unwrap_or(0);
            depth.insert(*node, d);
        }

        order.sort_by_key(|node| (depth.get(node).copied().unwrap_or(0), *node));
        Ok(order)
    }

    /// Deletion order
    pub fn reverse_order(&self) -> Result<Vec<Node>> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}
