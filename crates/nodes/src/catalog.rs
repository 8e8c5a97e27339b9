//! The node-type → credential binding dispatch table.
//!
//! A node's `type` selects exactly one [`CredentialBindingRule`]. The rule
//! says which credential kinds the node needs, under which scope, and how the
//! resolved credential is written back. Adding support for a new node type is
//! one [`NodeCatalog::register`] call.

use std::collections::HashMap;

use crate::storage::{DATA_STORE_NODE_TYPE, STORAGE_SELECTOR_FIELD};
use crate::{CredentialKind, Scope};

/// Whether a slot is needed unconditionally or only when the template
/// declares it on the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPresence {
    Always,
    /// e.g. an HTTP request node only needs header auth if the template
    /// author configured it.
    Declared,
}

/// One credential slot on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBinding {
    pub kind: CredentialKind,
    pub scope: Scope,
    pub presence: SlotPresence,
}

impl SlotBinding {
    /// Key under which the reference is stored in the node's credentials.
    pub fn slot(&self) -> &'static str {
        self.kind.type_key()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialBindingRule {
    /// The node type never carries credentials.
    NoCredentials,
    /// Fixed set of slots, written back under each kind's type key.
    Fixed(Vec<SlotBinding>),
    /// The user picks a backing store through `selector_field`; binding turns
    /// the node into the chosen backend's concrete node type.
    Selectable {
        selector_field: &'static str,
        scope: Scope,
    },
}

impl CredentialBindingRule {
    pub fn single(kind: CredentialKind, scope: Scope) -> Self {
        Self::Fixed(vec![SlotBinding { kind, scope, presence: SlotPresence::Always }])
    }

    pub fn declared(kind: CredentialKind, scope: Scope) -> Self {
        Self::Fixed(vec![SlotBinding { kind, scope, presence: SlotPresence::Declared }])
    }
}

/// Node types known to carry no credentials.
const CREDENTIAL_FREE: &[&str] = &[
    "n8n-nodes-base.webhook",
    "n8n-nodes-base.manualTrigger",
    "n8n-nodes-base.scheduleTrigger",
    "n8n-nodes-base.formTrigger",
    "n8n-nodes-base.respondToWebhook",
    "n8n-nodes-base.set",
    "n8n-nodes-base.if",
    "n8n-nodes-base.switch",
    "n8n-nodes-base.filter",
    "n8n-nodes-base.merge",
    "n8n-nodes-base.code",
    "n8n-nodes-base.noOp",
    "n8n-nodes-base.wait",
    "n8n-nodes-base.splitInBatches",
    "n8n-nodes-base.dateTime",
    "n8n-nodes-base.stickyNote",
    "@n8n/n8n-nodes-langchain.agent",
    "@n8n/n8n-nodes-langchain.chatTrigger",
    "@n8n/n8n-nodes-langchain.memoryBufferWindow",
    "@n8n/n8n-nodes-langchain.outputParserStructured",
];

/// Dispatch table keyed by node type.
#[derive(Debug, Clone)]
pub struct NodeCatalog {
    rules: HashMap<String, CredentialBindingRule>,
}

impl NodeCatalog {
    /// A catalogue with no entries at all.
    pub fn empty() -> Self {
        Self { rules: HashMap::new() }
    }

    /// The built-in node types.
    pub fn builtin() -> Self {
        use CredentialKind as K;
        use CredentialBindingRule as R;

        let mut catalog = Self::empty();
        for node_type in CREDENTIAL_FREE {
            catalog.register(*node_type, R::NoCredentials);
        }

        catalog
            // Mail falls back to the shared relay; chat models to the shared key.
            .register("n8n-nodes-base.emailSend", R::single(K::Smtp, Scope::Admin))
            .register("@n8n/n8n-nodes-langchain.lmChatOpenAi", R::single(K::OpenAiApi, Scope::Admin))
            .register("@n8n/n8n-nodes-langchain.openAi", R::single(K::OpenAiApi, Scope::Admin))
            .register("@n8n/n8n-nodes-langchain.embeddingsOpenAi", R::single(K::OpenAiApi, Scope::Admin))
            .register("n8n-nodes-base.emailReadImap", R::single(K::Imap, Scope::User))
            .register("n8n-nodes-base.gmail", R::single(K::GmailOAuth2, Scope::User))
            .register("n8n-nodes-base.gmailTrigger", R::single(K::GmailOAuth2, Scope::User))
            .register("n8n-nodes-base.googleSheets", R::single(K::GoogleSheetsOAuth2, Scope::User))
            .register("n8n-nodes-base.airtable", R::single(K::AirtableToken, Scope::User))
            .register("n8n-nodes-base.notion", R::single(K::NotionApi, Scope::User))
            .register("n8n-nodes-base.postgres", R::single(K::Postgres, Scope::User))
            .register("n8n-nodes-base.slack", R::single(K::SlackApi, Scope::User))
            .register("n8n-nodes-base.telegram", R::single(K::TelegramApi, Scope::User))
            .register("n8n-nodes-base.telegramTrigger", R::single(K::TelegramApi, Scope::User))
            .register("n8n-nodes-base.httpRequest", R::declared(K::HttpHeaderAuth, Scope::User))
            .register(
                DATA_STORE_NODE_TYPE,
                R::Selectable { selector_field: STORAGE_SELECTOR_FIELD, scope: Scope::User },
            );

        catalog
    }

    /// Add or replace the rule for `node_type`.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        rule: CredentialBindingRule,
    ) -> &mut Self {
        self.rules.insert(node_type.into(), rule);
        self
    }

    pub fn rule(&self, node_type: &str) -> Option<&CredentialBindingRule> {
        self.rules.get(node_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for NodeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageChoice;

    #[test]
    fn mail_node_falls_back_to_admin_relay() {
        let catalog = NodeCatalog::builtin();
        assert_eq!(
            catalog.rule("n8n-nodes-base.emailSend"),
            Some(&CredentialBindingRule::single(CredentialKind::Smtp, Scope::Admin))
        );
    }

    #[test]
    fn every_storage_backend_node_type_is_bindable() {
        let catalog = NodeCatalog::builtin();
        for choice in StorageChoice::ALL {
            let rule = catalog.rule(choice.node_type()).expect("backend type registered");
            assert_eq!(rule, &CredentialBindingRule::single(choice.kind(), Scope::User));
        }
    }

    #[test]
    fn unknown_types_have_no_rule() {
        assert!(NodeCatalog::builtin().rule("acme.frobnicate").is_none());
    }

    #[test]
    fn register_adds_a_new_type() {
        let mut catalog = NodeCatalog::empty();
        catalog.register("acme.mailer", CredentialBindingRule::single(CredentialKind::Smtp, Scope::User));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.rule("acme.mailer").is_some());
    }
}
