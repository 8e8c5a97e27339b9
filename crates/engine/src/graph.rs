//! Graph validation: run this before analysing or materializing a template.
//!
//! Rules enforced:
//! 1. Node names must be unique within the graph (connections refer to names).
//! 2. Every connection must reference existing nodes on both ends.
//!
//! Cycles are allowed: batching loops feed back into earlier nodes.

use std::collections::{BTreeMap, HashSet};

use crate::models::{Node, NodeOutputs, TemplateGraph};
use crate::EngineError;

/// Validate the node names and connection endpoints of `graph`.
///
/// # Errors
/// - [`EngineError::DuplicateNodeName`] if two nodes share a name.
/// - [`EngineError::UnknownConnectionNode`] if a connection references a missing node.
pub fn validate_graph(graph: &TemplateGraph) -> Result<(), EngineError> {
    validate_parts(&graph.nodes, &graph.connections)
}

pub(crate) fn validate_parts(
    nodes: &[Node],
    connections: &BTreeMap<String, NodeOutputs>,
) -> Result<(), EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node names are unique
    // -----------------------------------------------------------------------
    let mut names: HashSet<&str> = HashSet::new();
    for node in nodes {
        if !names.insert(node.name.as_str()) {
            return Err(EngineError::DuplicateNodeName(node.name.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate connection endpoints
    // -----------------------------------------------------------------------
    for (source, outputs) in connections {
        if !names.contains(source.as_str()) {
            return Err(EngineError::UnknownConnectionNode {
                node: source.clone(),
                side: "source",
            });
        }

        let targets = outputs
            .values()
            .flatten()
            .flatten()
            .flatten();

        for target in targets {
            if !names.contains(target.node.as_str()) {
                return Err(EngineError::UnknownConnectionNode {
                    node: target.node.clone(),
                    side: "target",
                });
            }
        }
    }

    Ok(())
}
