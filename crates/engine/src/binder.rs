//! Binds resolved credentials onto the nodes of a rewritten graph.
//!
//! Every catalogued node ends up with exactly the references its rule calls
//! for and this run resolved. Whatever the template author left behind (their
//! own credential ids, slots the node doesn't need, slots nothing resolved)
//! is dropped. Binding an already bound graph changes nothing.

use std::collections::BTreeMap;

use nodes::{NodeCatalog, StorageChoice};
use serde_json::Value;
use tracing::debug;

use crate::analyzer::{node_binding, NodeBinding};
use crate::models::{CredentialRef, Node, TemplateGraph};
use crate::resolver::ResolvedCredentials;
use crate::EngineError;

/// Overwrite the credential references of every node in `graph`.
///
/// # Errors
/// - [`EngineError::Binding`] for an uncatalogued type carrying credentials.
/// - [`EngineError::Consistency`] if a data-store node has no resolved
///   backend.
///
/// A slot with no resolved credential is removed, never left pointing at the
/// author's id.
pub fn bind_credentials(
    graph: &mut TemplateGraph,
    resolved: &ResolvedCredentials,
    catalog: &NodeCatalog,
) -> Result<(), EngineError> {
    for node in &mut graph.nodes {
        match node_binding(node, catalog)? {
            NodeBinding::Untouched => {}
            NodeBinding::Slots(slots) => {
                let mut bound = BTreeMap::new();
                for slot in slots {
                    match resolved.get(slot.kind, slot.scope) {
                        Some(credential) => {
                            bound.insert(slot.slot().to_owned(), CredentialRef::Reference(credential.reference()));
                        }
                        None => debug!("'{}': no {} credential resolved, slot removed", node.name, slot.kind),
                    }
                }
                if bound != node.credentials {
                    debug!("bound {} credential slot(s) on '{}'", bound.len(), node.name);
                }
                node.credentials = bound;
            }
            NodeBinding::Storage { .. } => bind_storage_node(node, resolved)?,
        }
    }
    Ok(())
}

/// Turn a generic data-store node into the selected backend's node.
///
/// Backend-specific parameters may be nested under the backend's selector
/// value (`{"airtable": {...}, "notion": {...}}`); the selected block then
/// becomes the node's parameters.
fn bind_storage_node(node: &mut Node, resolved: &ResolvedCredentials) -> Result<(), EngineError> {
    let (choice, credential) = match (resolved.storage_choice(), resolved.storage_credential()) {
        (Some(choice), Some(credential)) => (choice, credential),
        _ => {
            return Err(EngineError::Consistency(format!(
                "data-store node '{}' has no resolved storage backend",
                node.name
            )))
        }
    };

    node.node_type = choice.node_type().to_owned();
    node.type_version = Some(Value::from(choice.type_version()));
    if let Some(block) = backend_parameters(&node.parameters, choice) {
        node.parameters = block;
    }
    node.credentials = BTreeMap::from([(
        choice.kind().type_key().to_owned(),
        CredentialRef::Reference(credential.reference()),
    )]);

    debug!("data-store node '{}' bound to {}", node.name, choice);
    Ok(())
}

fn backend_parameters(parameters: &Value, choice: StorageChoice) -> Option<Value> {
    parameters
        .get(choice.value())
        .filter(|block| block.is_object())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::storage_requirement;
    use crate::models::{Origin, ResolvedCredential};
    use nodes::{CredentialKind, Scope};
    use serde_json::json;

    fn credential(kind: CredentialKind, id: &str, origin: Origin) -> ResolvedCredential {
        ResolvedCredential { kind, external_id: id.into(), display_name: format!("{kind} {id}"), origin }
    }

    fn graph(nodes: Value) -> TemplateGraph {
        serde_json::from_value(json!({"nodes": nodes, "connections": {}})).unwrap()
    }

    fn bound_id(node: &Node, slot: &str) -> Option<String> {
        match node.credentials.get(slot)? {
            CredentialRef::Reference(r) => r.id.clone(),
            CredentialRef::Placeholder(_) => None,
        }
    }

    #[test]
    fn author_references_are_replaced_and_stale_slots_dropped() {
        let mut resolved = ResolvedCredentials::default();
        resolved.insert(CredentialKind::Smtp, Scope::Admin, credential(CredentialKind::Smtp, "c-1", Origin::FreshlyCreated));

        let mut g = graph(json!([{
            "name": "Mail",
            "type": "n8n-nodes-base.emailSend",
            "credentials": {
                "smtp": {"id": "author-1", "name": "Author SMTP"},
                "imap": {"id": "author-2", "name": "Leftover"}
            }
        }, {
            "name": "Hook",
            "type": "n8n-nodes-base.webhook",
            "credentials": {"httpBasicAuth": {"id": "author-3", "name": "x"}}
        }]));

        bind_credentials(&mut g, &resolved, &NodeCatalog::builtin()).unwrap();

        assert_eq!(g.nodes[0].credentials.len(), 1);
        assert_eq!(bound_id(&g.nodes[0], "smtp").as_deref(), Some("c-1"));
        assert!(g.nodes[1].credentials.is_empty());
    }

    #[test]
    fn binding_twice_is_a_no_op() {
        let mut resolved = ResolvedCredentials::default();
        resolved.select_storage(StorageChoice::Notion, Scope::User);
        resolved.insert(CredentialKind::NotionApi, Scope::User, credential(CredentialKind::NotionApi, "n-1", Origin::Reused));
        resolved.insert(CredentialKind::OpenAiApi, Scope::Admin, credential(CredentialKind::OpenAiApi, "o-1", Origin::SystemShared));

        let mut g = graph(json!([
            {"name": "Chat", "type": "@n8n/n8n-nodes-langchain.lmChatOpenAi"},
            {"name": "Save", "type": nodes::DATA_STORE_NODE_TYPE,
             "parameters": {"notion": {"databaseId": "db-1"}, "airtable": {"base": "b"}}}
        ]));
        let catalog = NodeCatalog::builtin();

        bind_credentials(&mut g, &resolved, &catalog).unwrap();
        let once = serde_json::to_value(&g).unwrap();
        bind_credentials(&mut g, &resolved, &catalog).unwrap();

        assert_eq!(serde_json::to_value(&g).unwrap(), once);
    }

    #[test]
    fn storage_node_becomes_the_selected_backend() {
        let mut resolved = ResolvedCredentials::default();
        let req = storage_requirement("storage_backend", Scope::User);
        resolved.select_storage(StorageChoice::Airtable, req.scope);
        resolved.insert(
            CredentialKind::AirtableToken,
            Scope::User,
            credential(CredentialKind::AirtableToken, "a-1", Origin::FreshlyCreated),
        );

        let mut g = graph(json!([{
            "name": "Save",
            "type": nodes::DATA_STORE_NODE_TYPE,
            "parameters": {"airtable": {"base": "app1", "table": "leads"}, "notion": {"databaseId": "x"}}
        }]));

        bind_credentials(&mut g, &resolved, &NodeCatalog::builtin()).unwrap();

        let node = &g.nodes[0];
        assert_eq!(node.node_type, "n8n-nodes-base.airtable");
        assert_eq!(node.parameters, json!({"base": "app1", "table": "leads"}));
        assert_eq!(bound_id(node, "airtableTokenApi").as_deref(), Some("a-1"));
    }

    #[test]
    fn unresolved_slot_drops_the_author_reference() {
        let mut g = graph(json!([{
            "name": "Inbox",
            "type": "n8n-nodes-base.gmail",
            "credentials": {"gmailOAuth2": {"id": "author-1", "name": "Author Gmail"}}
        }]));

        bind_credentials(&mut g, &ResolvedCredentials::default(), &NodeCatalog::builtin()).unwrap();

        assert!(g.nodes[0].credentials.is_empty());
    }

    #[test]
    fn uncatalogued_node_with_credentials_is_rejected() {
        let mut g = graph(json!([{
            "name": "Mystery",
            "type": "acme.mystery",
            "credentials": {"acmeApi": {"id": "1", "name": "x"}}
        }]));
        let err = bind_credentials(&mut g, &ResolvedCredentials::default(), &NodeCatalog::builtin()).unwrap_err();
        assert!(matches!(err, EngineError::Binding { node, .. } if node == "Mystery"));
    }
}
