//! Credential requirement analysis.
//!
//! Walks a template's nodes in graph order and classifies each one through
//! the node catalogue. Pure: no I/O, the same template always yields the same
//! list.

use nodes::{CredentialBindingRule, CredentialKind, NodeCatalog, Scope, SlotBinding, SlotPresence, StorageChoice};
use tracing::debug;

use crate::models::{ConditionalOption, CredentialRequirement, Node, RequirementKind, WorkflowTemplate};
use crate::placeholder::{self, STORAGE_TOKEN_ARG};
use crate::EngineError;

/// How the catalogue says a particular node is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeBinding {
    /// Unknown type without credentials: left exactly as authored.
    Untouched,
    /// The slots this node needs; an empty list strips every reference.
    Slots(Vec<SlotBinding>),
    /// Generic data-store node resolved through a selector field.
    Storage { selector_field: &'static str, scope: Scope },
}

/// Classify `node` through the dispatch table.
///
/// # Errors
/// [`EngineError::Binding`] if the type is not in the catalogue but the node
/// carries credential references anyway.
pub(crate) fn node_binding(node: &Node, catalog: &NodeCatalog) -> Result<NodeBinding, EngineError> {
    match catalog.rule(&node.node_type) {
        None if node.credentials.is_empty() => {
            debug!("node '{}' has uncatalogued type '{}' and no credentials", node.name, node.node_type);
            Ok(NodeBinding::Untouched)
        }
        None => Err(EngineError::Binding {
            node: node.name.clone(),
            node_type: node.node_type.clone(),
        }),
        Some(CredentialBindingRule::NoCredentials) => Ok(NodeBinding::Slots(Vec::new())),
        Some(CredentialBindingRule::Fixed(slots)) => Ok(NodeBinding::Slots(
            slots
                .iter()
                .filter(|s| s.presence == SlotPresence::Always || node.credentials.contains_key(s.slot()))
                .copied()
                .collect(),
        )),
        Some(CredentialBindingRule::Selectable { selector_field, scope }) => Ok(NodeBinding::Storage {
            selector_field,
            scope: *scope,
        }),
    }
}

pub(crate) fn storage_requirement(selector_field: &str, scope: Scope) -> CredentialRequirement {
    CredentialRequirement {
        kind: RequirementKind::Conditional {
            selector_field: selector_field.to_owned(),
            options: StorageChoice::ALL
                .into_iter()
                .map(|value| ConditionalOption { value, kind: value.kind() })
                .collect(),
        },
        scope,
    }
}

/// Produce the ordered, de-duplicated credential requirements of `template`.
///
/// Requirements come out in the order their first node appears, and are
/// unique per `(kind, scope)`; conditional ones per `(selector, scope)`.
/// Credential placeholders naming a kind no node needs add a `User`-scoped
/// requirement at the end.
///
/// # Errors
/// - [`EngineError::Binding`] for uncatalogued node types carrying credentials.
/// - [`EngineError::InvalidTemplate`] for a placeholder naming an unknown kind.
pub fn analyze_requirements(
    template: &WorkflowTemplate,
    catalog: &NodeCatalog,
) -> Result<Vec<CredentialRequirement>, EngineError> {
    let mut requirements: Vec<CredentialRequirement> = Vec::new();
    let mut push = |req: CredentialRequirement| {
        if !requirements.contains(&req) {
            requirements.push(req);
        }
    };

    for node in &template.graph().nodes {
        match node_binding(node, catalog)? {
            NodeBinding::Untouched => {}
            NodeBinding::Slots(slots) => {
                for slot in slots {
                    push(CredentialRequirement::fixed(slot.kind, slot.scope));
                }
            }
            NodeBinding::Storage { selector_field, scope } => {
                push(storage_requirement(selector_field, scope));
            }
        }
    }

    for arg in placeholder::credential_args(template.source()) {
        if arg == STORAGE_TOKEN_ARG {
            let has_storage = requirements
                .iter()
                .any(|r| matches!(r.kind, RequirementKind::Conditional { .. }));
            if !has_storage {
                requirements.push(storage_requirement(nodes::STORAGE_SELECTOR_FIELD, Scope::User));
            }
            continue;
        }

        let kind: CredentialKind = arg.parse().map_err(|e: nodes::CatalogError| {
            EngineError::InvalidTemplate(format!("placeholder {{{{credential:{arg}}}}}: {e}"))
        })?;
        let covered = requirements
            .iter()
            .any(|r| matches!(r.kind, RequirementKind::Fixed { kind: k } if k == kind));
        if !covered {
            requirements.push(CredentialRequirement::fixed(kind, Scope::User));
        }
    }

    Ok(requirements)
}

/// Input fields the template references through `{{input:…}}` tokens.
pub fn referenced_inputs(template: &WorkflowTemplate) -> Vec<String> {
    placeholder::input_fields(template.source())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn template(nodes: Value) -> WorkflowTemplate {
        let source = json!({"nodes": nodes, "connections": {}}).to_string();
        WorkflowTemplate::new("tpl", "Test", source).expect("valid template")
    }

    fn node(name: &str, node_type: &str) -> Value {
        json!({"name": name, "type": node_type, "parameters": {}})
    }

    #[test]
    fn identical_needs_collapse_into_one_requirement() {
        let nodes: Vec<Value> = (0..10)
            .map(|i| node(&format!("mail {i}"), "n8n-nodes-base.emailSend"))
            .collect();

        let reqs = analyze_requirements(&template(Value::Array(nodes)), &NodeCatalog::builtin()).unwrap();
        assert_eq!(reqs, vec![CredentialRequirement::fixed(CredentialKind::Smtp, Scope::Admin)]);
    }

    #[test]
    fn requirements_follow_graph_order() {
        let t = template(json!([
            node("Trigger", "n8n-nodes-base.webhook"),
            node("Chat", "@n8n/n8n-nodes-langchain.lmChatOpenAi"),
            node("Inbox", "n8n-nodes-base.gmail"),
            node("Mail", "n8n-nodes-base.emailSend"),
        ]));

        let reqs = analyze_requirements(&t, &NodeCatalog::builtin()).unwrap();
        assert_eq!(
            reqs,
            vec![
                CredentialRequirement::fixed(CredentialKind::OpenAiApi, Scope::Admin),
                CredentialRequirement::fixed(CredentialKind::GmailOAuth2, Scope::User),
                CredentialRequirement::fixed(CredentialKind::Smtp, Scope::Admin),
            ]
        );
    }

    #[test]
    fn data_store_node_yields_one_conditional_requirement() {
        let t = template(json!([
            node("Store A", nodes::DATA_STORE_NODE_TYPE),
            node("Store B", nodes::DATA_STORE_NODE_TYPE),
        ]));

        let reqs = analyze_requirements(&t, &NodeCatalog::builtin()).unwrap();
        assert_eq!(reqs.len(), 1);
        let RequirementKind::Conditional { selector_field, options } = &reqs[0].kind else {
            panic!("expected conditional requirement");
        };
        assert_eq!(selector_field, "storage_backend");
        assert_eq!(options.len(), 4);
    }

    #[test]
    fn declared_slots_only_count_when_present() {
        let bare = template(json!([node("Fetch", "n8n-nodes-base.httpRequest")]));
        assert!(analyze_requirements(&bare, &NodeCatalog::builtin()).unwrap().is_empty());

        let authed = template(json!([{
            "name": "Fetch",
            "type": "n8n-nodes-base.httpRequest",
            "credentials": {"httpHeaderAuth": {"id": "author-7", "name": "Author's key"}}
        }]));
        assert_eq!(
            analyze_requirements(&authed, &NodeCatalog::builtin()).unwrap(),
            vec![CredentialRequirement::fixed(CredentialKind::HttpHeaderAuth, Scope::User)]
        );
    }

    #[test]
    fn uncatalogued_type_with_credentials_is_a_binding_error() {
        let t = template(json!([{
            "name": "Mystery",
            "type": "acme.mystery",
            "credentials": {"acmeApi": {"id": "1", "name": "x"}}
        }]));
        assert!(matches!(
            analyze_requirements(&t, &NodeCatalog::builtin()),
            Err(EngineError::Binding { node, .. }) if node == "Mystery"
        ));
    }

    #[test]
    fn uncatalogued_type_without_credentials_is_ignored() {
        let t = template(json!([node("Custom", "acme.formatter")]));
        assert!(analyze_requirements(&t, &NodeCatalog::builtin()).unwrap().is_empty());
    }

    #[test]
    fn credential_token_outside_nodes_adds_user_requirement() {
        let source = r#"{"nodes": [{"name": "Code", "type": "n8n-nodes-base.code",
            "parameters": {"jsCode": "// key {{credential:slack}}"}}], "connections": {}}"#;
        let t = WorkflowTemplate::new("tpl", "Test", source).unwrap();

        assert_eq!(
            analyze_requirements(&t, &NodeCatalog::builtin()).unwrap(),
            vec![CredentialRequirement::fixed(CredentialKind::SlackApi, Scope::User)]
        );
    }

    #[test]
    fn unknown_kind_in_token_is_invalid_template() {
        let source = r#"{"nodes": [], "connections": {}, "meta": {{credential:fax}}}"#;
        let t = WorkflowTemplate::new("tpl", "Test", source).unwrap();
        assert!(matches!(
            analyze_requirements(&t, &NodeCatalog::builtin()),
            Err(EngineError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn referenced_inputs_come_from_the_source() {
        let source = r#"{"nodes": [{"name": "Set", "type": "n8n-nodes-base.set",
            "parameters": {"to": "{{input:recipient}}", "cc": "{{input:cc}}"}}], "connections": {}}"#;
        let t = WorkflowTemplate::new("tpl", "Test", source).unwrap();
        assert_eq!(referenced_inputs(&t), vec!["recipient", "cc"]);
    }
}
