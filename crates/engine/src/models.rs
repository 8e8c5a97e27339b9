//! Core domain models for the materialization engine.
//!
//! Graph types follow the automation service's workflow JSON closely enough
//! that a template exported from the service parses unchanged, and unknown
//! fields ride along in `extra` so nothing the author set is lost.

use std::collections::BTreeMap;

use nodes::{CredentialKind, Scope, StorageChoice};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{graph::validate_graph, placeholder, EngineError};

// ---------------------------------------------------------------------------
// Credential references
// ---------------------------------------------------------------------------

/// `{id, name}` object a node uses to point at an external credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

/// What sits in a node's credential slot: a placeholder token (templates) or
/// a concrete reference (authored, or bound by this engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialRef {
    Placeholder(String),
    Reference(CredentialReference),
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub node: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    #[serde(default)]
    pub index: u32,
}

/// Output type (`main`, `ai_languageModel`, …) → output index → targets.
pub type NodeOutputs = BTreeMap<String, Vec<Option<Vec<ConnectionTarget>>>>;

/// A single node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique within the graph; connections refer to nodes by name.
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_version: Option<Value>,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, CredentialRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,

    // Execution flags, carried through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub always_output_data: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_fail: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on_fail: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_once: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    /// Anything else (`position`, `notes`, …).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Nodes plus connections, as found in a template or a materialized instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateGraph {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: BTreeMap<String, NodeOutputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    /// Top-level fields the template happened to be exported with.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// WorkflowTemplate
// ---------------------------------------------------------------------------

/// A reusable workflow graph with credential placeholders.
///
/// Immutable once constructed: `source` is the stored text that gets
/// rewritten, `graph` is the parsed skeleton used for analysis.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    source: String,
    graph: TemplateGraph,
}

impl WorkflowTemplate {
    /// Parse and validate a stored template.
    ///
    /// # Errors
    /// - [`EngineError::InvalidTemplate`] if the text doesn't parse.
    /// - [`EngineError::DuplicateNodeName`] / [`EngineError::UnknownConnectionNode`]
    ///   if the graph is malformed.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let source = source.into();
        let skeleton = placeholder::quote_bare_tokens(&source);
        let graph: TemplateGraph = serde_json::from_str(&skeleton)
            .map_err(|e| EngineError::InvalidTemplate(e.to_string()))?;
        validate_graph(&graph)?;

        Ok(Self { id: id.into(), name: name.into(), source, graph })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn graph(&self) -> &TemplateGraph {
        &self.graph
    }
}

// ---------------------------------------------------------------------------
// Requirements and resolutions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionalOption {
    pub value: StorageChoice,
    pub kind: CredentialKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequirementKind {
    Fixed {
        kind: CredentialKind,
    },
    /// The selector field's value picks one option; the rest are dropped.
    Conditional {
        selector_field: String,
        options: Vec<ConditionalOption>,
    },
}

/// One distinct credential need of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialRequirement {
    #[serde(flatten)]
    pub kind: RequirementKind,
    pub scope: Scope,
}

impl CredentialRequirement {
    pub fn fixed(kind: CredentialKind, scope: Scope) -> Self {
        Self { kind: RequirementKind::Fixed { kind }, scope }
    }
}

/// How a resolved credential came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Previously obtained by the user and found in the credential store.
    Reused,
    /// Created during this run; the manifest owner must clean it up.
    FreshlyCreated,
    /// Direct external id supplied by the user.
    UserSupplied,
    /// The system-owned singleton behind an admin-scoped requirement.
    SystemShared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCredential {
    pub kind: CredentialKind,
    pub external_id: String,
    pub display_name: String,
    pub origin: Origin,
}

impl ResolvedCredential {
    pub fn reference(&self) -> CredentialReference {
        CredentialReference {
            id: Some(self.external_id.clone()),
            name: self.display_name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// DeployedInstanceManifest
// ---------------------------------------------------------------------------

/// Terminal artifact of one materialization run.
///
/// `resolved_credentials` is the only ledger of `FreshlyCreated` resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedInstanceManifest {
    pub template_id: String,
    pub user_id: String,
    pub webhook_path: String,
    pub resolved_credentials: Vec<ResolvedCredential>,
}

impl DeployedInstanceManifest {
    pub fn freshly_created(&self) -> impl Iterator<Item = &ResolvedCredential> {
        self.resolved_credentials
            .iter()
            .filter(|c| c.origin == Origin::FreshlyCreated)
    }
}
