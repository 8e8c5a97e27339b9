//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models and carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflow_templates
// ---------------------------------------------------------------------------

/// A stored workflow template.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateRow {
    pub id: String,
    pub name: String,
    /// Serialized graph text, placeholders included. Not valid JSON until
    /// materialized, hence `TEXT` rather than `JSONB`.
    pub definition: String,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// user_credentials
// ---------------------------------------------------------------------------

/// A credential previously obtained for an owner (a user, or the system).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CredentialRow {
    pub id: Uuid,
    pub owner_id: String,
    /// Credential type key (`smtp`, `gmailOAuth2`, …).
    pub kind: String,
    /// Id of the credential object inside the automation service.
    pub external_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// deployments
// ---------------------------------------------------------------------------

/// A deployed workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeploymentRow {
    pub id: Uuid,
    pub template_id: String,
    pub user_id: String,
    /// Id returned by the automation service's workflow create call.
    pub workflow_id: String,
    pub webhook_path: String,
    /// Serialized deployment manifest (credentials created or reused).
    pub manifest: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
