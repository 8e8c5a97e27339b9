//! `engine` crate: template materialization and credential resolution.
//!
//! A stored workflow template carries placeholder tokens where per-user
//! values belong. Materializing it for a user analyses which credentials its
//! nodes need, resolves each one (reusing, creating or falling back to a
//! shared system credential), rewrites the placeholders, binds the
//! credentials onto nodes and assembles an instance document the automation
//! service can deploy.

pub mod analyzer;
pub mod assembler;
pub mod binder;
pub mod client;
pub mod config;
pub mod deploy;
pub mod error;
pub mod graph;
pub mod inputs;
pub mod ledger;
pub mod locks;
pub mod materializer;
pub mod mock;
pub mod models;
pub mod placeholder;
pub mod ports;
pub mod resolver;
pub mod schedule;
pub mod store;
pub mod webhook;

pub use analyzer::{analyze_requirements, referenced_inputs};
pub use assembler::{InstanceDocument, WorkflowSettings};
pub use binder::bind_credentials;
pub use client::{HttpAutomationService, ServiceConfig};
pub use config::{EngineConfig, SYSTEM_OWNER};
pub use deploy::{Deployer, TemplateRequirements};
pub use error::{EngineError, ErrorClass};
pub use graph::validate_graph;
pub use inputs::UserInputs;
pub use ledger::RunLedger;
pub use locks::ProvisioningLocks;
pub use materializer::{Materialization, Materializer};
pub use models::{
    CredentialRequirement, DeployedInstanceManifest, Origin, RequirementKind, ResolvedCredential, WorkflowTemplate,
};
pub use ports::{AutomationService, CredentialStore, Deployment, DeploymentStore, TemplateStore};
pub use resolver::ResolvedCredentials;
pub use webhook::webhook_path;
