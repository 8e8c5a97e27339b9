//! Builds the instance document handed to the automation service, and the
//! final checks it must pass before anything is deployed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::graph::validate_parts;
use crate::models::{CredentialRef, Node, NodeOutputs, TemplateGraph};
use crate::placeholder;
use crate::resolver::ResolvedCredentials;
use crate::EngineError;

const DEFAULT_EXECUTION_ORDER: &str = "v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    pub execution_order: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A fully materialized workflow, ready for the service's create call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDocument {
    pub name: String,
    pub nodes: Vec<Node>,
    pub connections: BTreeMap<String, NodeOutputs>,
    pub settings: WorkflowSettings,
}

impl InstanceDocument {
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// Assemble the document from a bound graph.
///
/// Export-only top-level fields (`pinData`, `meta`, `tags`, …) are not part
/// of an instance and are dropped. `timezone` overrides whatever the template
/// settings carry.
pub fn assemble(graph: TemplateGraph, name: String, timezone: Option<String>) -> InstanceDocument {
    if !graph.extra.is_empty() {
        debug!(
            "dropping template-level fields: {}",
            graph.extra.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        );
    }

    let template_setting = |key: &str| {
        graph
            .settings
            .as_ref()
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
            .map(str::to_owned)
    };

    let settings = WorkflowSettings {
        execution_order: template_setting("executionOrder").unwrap_or_else(|| DEFAULT_EXECUTION_ORDER.to_owned()),
        timezone: timezone.or_else(|| template_setting("timezone")),
    };

    InstanceDocument {
        name,
        nodes: graph.nodes,
        connections: graph.connections,
        settings,
    }
}

/// Final consistency checks on an assembled document.
///
/// # Errors
/// [`EngineError::Consistency`] if a placeholder survived, a node references a
/// credential this run did not resolve, a generic data-store node is left, or
/// the graph is no longer well formed. Graph shape errors keep their own
/// variants.
pub fn verify(document: &InstanceDocument, resolved: &ResolvedCredentials) -> Result<(), EngineError> {
    let text = serde_json::to_string(document)
        .map_err(|e| EngineError::Consistency(format!("instance does not serialize: {e}")))?;
    let leftover = placeholder::find_tokens(&text);
    if !leftover.is_empty() {
        return Err(EngineError::Consistency(format!(
            "placeholders left in instance: {}",
            leftover.join(", ")
        )));
    }

    for node in &document.nodes {
        if node.node_type == nodes::DATA_STORE_NODE_TYPE {
            return Err(EngineError::Consistency(format!(
                "data-store node '{}' was not bound to a backend",
                node.name
            )));
        }

        for (slot, reference) in &node.credentials {
            let id = match reference {
                CredentialRef::Reference(r) => r.id.as_deref(),
                CredentialRef::Placeholder(_) => None,
            };
            match id {
                Some(id) if resolved.contains_external_id(id) => {}
                _ => {
                    return Err(EngineError::Consistency(format!(
                        "node '{}' slot '{}' references a credential outside this run",
                        node.name, slot
                    )))
                }
            }
        }
    }

    validate_parts(&document.nodes, &document.connections)
}
