//! Block topology derived from the project graph.
//!
//! Only nodes of kind `"block"` and edges of kind `"connects"` between two
//! blocks take part in a run. Blocks keep their node-list order, which is
//! also the order their processes are started in.

use std::collections::HashMap;

use crate::model::ProjectGraph;

/// Simulated blocks and the routes items take between them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    blocks: Vec<String>,
    index: HashMap<String, usize>,
    routes: Vec<Vec<usize>>,
}

impl Topology {
    /// Builds the topology from a project graph.
    ///
    /// A block id that appears twice keeps its first position. Duplicate
    /// edges are kept, so the target receives one copy per edge.
    pub fn from_graph(graph: &ProjectGraph) -> Self {
        let mut topology = Self::default();
        for node in graph.nodes.iter().filter(|n| n.is_block()) {
            if topology.index.contains_key(&node.id) {
                continue;
            }
            topology.index.insert(node.id.clone(), topology.blocks.len());
            topology.blocks.push(node.id.clone());
            topology.routes.push(Vec::new());
        }

        for edge in graph.edges.iter().filter(|e| e.is_connects()) {
            let (Some(source), Some(target)) = (&edge.source_id, &edge.target_id) else {
                continue;
            };
            if let (Some(&from), Some(&to)) =
                (topology.index.get(source), topology.index.get(target))
            {
                topology.routes[from].push(to);
            }
        }
        topology
    }

    /// Block ids in start order.
    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the graph has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Position of `block_id` in start order.
    pub fn position(&self, block_id: &str) -> Option<usize> {
        self.index.get(block_id).copied()
    }

    /// Downstream block positions of the block at `position`, one per edge.
    pub fn downstream(&self, position: usize) -> &[usize] {
        self.routes.get(position).map(Vec::as_slice).unwrap_or(&[])
    }
}
