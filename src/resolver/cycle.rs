//! Import cycle detection.
//!
//! Every load session keeps one [`CycleGraph`]: a directed graph whose nodes
//! are canonical module paths and whose edges record "imports". An edge is
//! only committed after proving it closes no cycle, so detection happens
//! before the target file is ever read.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::{Error, Result};

/// Directed import graph for one load session.
#[derive(Debug, Default)]
pub(crate) struct CycleGraph {
    graph: DiGraph<PathBuf, ()>,
    node_map: HashMap<PathBuf, NodeIndex>,
}

impl CycleGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a path as a node if it is not already tracked.
    fn ensure_node(&mut self, path: &Path) -> NodeIndex {
        if let Some(&index) = self.node_map.get(path) {
            index
        } else {
            let index = self.graph.add_node(path.to_path_buf());
            self.node_map.insert(path.to_path_buf(), index);
            index
        }
    }

    /// Record that `from` imports `to`, refusing the edge if it would close
    /// a cycle. On refusal the error lists the full cycle path.
    pub(crate) fn add_import(&mut self, from: &Path, to: &Path) -> Result<()> {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);

        if from_idx == to_idx {
            return Err(Error::CircularImport {
                cycle: format!("{} -> {}", from.display(), to.display()),
            });
        }

        // A path from `to` back to `from` means this edge closes a loop.
        if let Some(back_path) = self.find_path(to_idx, from_idx) {
            // The back path ends at `from`, which also opens the rendering.
            let mut cycle: Vec<String> = Vec::with_capacity(back_path.len() + 1);
            cycle.push(self.graph[from_idx].display().to_string());
            for idx in &back_path[..back_path.len() - 1] {
                cycle.push(self.graph[*idx].display().to_string());
            }
            cycle.push(self.graph[from_idx].display().to_string());
            return Err(Error::CircularImport {
                cycle: cycle.join(" -> "),
            });
        }

        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
        Ok(())
    }

    /// BFS from `start` to `goal`, returning the node path if one exists.
    fn find_path(&self, start: NodeIndex, goal: NodeIndex) -> Option<Vec<NodeIndex>> {
        let mut predecessor: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if current == goal {
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(&prev) = predecessor.get(&cursor) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for neighbor in self.graph.neighbors(current) {
                if neighbor != start && !predecessor.contains_key(&neighbor) {
                    predecessor.insert(neighbor, current);
                    queue.push_back(neighbor);
                }
            }
        }
        None
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}
