//! Deterministic webhook paths.
//!
//! The path depends only on `(template_id, user_id)`, so redeploying the same
//! template for the same user keeps every external caller working.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::models::TemplateGraph;

/// Node types that listen on an instance webhook path.
pub const WEBHOOK_NODE_TYPES: [&str; 3] = [
    "n8n-nodes-base.webhook",
    "n8n-nodes-base.formTrigger",
    "@n8n/n8n-nodes-langchain.chatTrigger",
];

const HASH_LEN: usize = 12;

fn short_hash(value: &str) -> String {
    let mut hex = hex::encode(Sha256::digest(value.as_bytes()));
    hex.truncate(HASH_LEN);
    hex
}

/// Webhook path of the instance of `template_id` deployed for `user_id`.
pub fn webhook_path(template_id: &str, user_id: &str) -> String {
    format!("{}-{}", short_hash(template_id), short_hash(user_id))
}

/// Stable webhook id for a path.
pub fn webhook_id(path: &str) -> Uuid {
    let digest = Sha256::digest(path.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// Point every webhook node of `graph` at `path`.
///
/// The first listener gets `path` itself, later ones `path-2`, `path-3`, …
/// in graph order. Returns how many nodes were updated.
pub fn apply_webhook(graph: &mut TemplateGraph, path: &str) -> usize {
    let mut count = 0;
    for node in graph
        .nodes
        .iter_mut()
        .filter(|n| WEBHOOK_NODE_TYPES.contains(&n.node_type.as_str()))
    {
        count += 1;
        let node_path = if count == 1 { path.to_owned() } else { format!("{path}-{count}") };

        if !node.parameters.is_object() {
            node.parameters = Value::Object(Map::new());
        }
        if let Some(params) = node.parameters.as_object_mut() {
            params.insert("path".to_owned(), Value::from(node_path.as_str()));
        }
        node.webhook_id = Some(webhook_id(&node_path).to_string());
        debug!("webhook node '{}' listens on /{}", node.name, node_path);
    }
    count
}
