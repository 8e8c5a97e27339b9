//! `nodes` crate: the node-type catalogue.
//!
//! Describes which external credentials each workflow node type needs and
//! how a resolved credential is written back onto such a node. Everything in
//! here is static data plus pure functions: the engine crate walks template
//! graphs through [`NodeCatalog`] both when collecting requirements and when
//! binding credentials, so the two passes can never disagree.

pub mod catalog;
pub mod error;
pub mod kinds;
pub mod storage;

pub use catalog::{CredentialBindingRule, NodeCatalog, SlotBinding, SlotPresence};
pub use error::CatalogError;
pub use kinds::{CredentialKind, FieldSpec, FieldType, Provisioning, Scope};
pub use storage::{StorageChoice, DATA_STORE_NODE_TYPE, STORAGE_SELECTOR_FIELD};
