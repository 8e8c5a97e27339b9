//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the materialization engine.
///
/// Every variant aborts the run. Nothing is downgraded to a warning: a
/// partially bound instance deploys fine and then fails remotely with no
/// context.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Template shape ------

    #[error("template '{0}' not found")]
    TemplateNotFound(String),

    #[error("deployment {0} not found")]
    DeploymentNotFound(uuid::Uuid),

    /// The stored template text does not parse, even with placeholders quoted.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("duplicate node name: '{0}'")]
    DuplicateNodeName(String),

    /// A connection names a node that doesn't exist in the graph.
    #[error("connection references unknown node '{node}' ({side} side)")]
    UnknownConnectionNode {
        node: String,
        side: &'static str,
    },

    // ------ Materialization ------

    /// A requirement has no viable resolution path given the inputs.
    #[error("cannot resolve {requirement}: missing {}", missing_fields.join(", "))]
    Validation {
        requirement: String,
        missing_fields: Vec<String>,
    },

    /// The automation service rejected a create call.
    #[error("automation service rejected {operation}{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    UpstreamProvisioning {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// A node type outside the dispatch table carries credential references.
    #[error("node '{node}' of unsupported type '{node_type}' carries credential references")]
    Binding {
        node: String,
        node_type: String,
    },

    /// The pipeline produced something that would only fail at execution time.
    #[error("consistency check failed: {0}")]
    Consistency(String),

    /// The caller-level deadline fired before `operation` finished.
    #[error("{operation} did not finish within {after:?}")]
    DeadlineExceeded {
        operation: &'static str,
        after: std::time::Duration,
    },

    // ------ Collaborators ------

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

/// Coarse classification for callers that map errors onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Validation,
    Upstream,
    Timeout,
    Internal,
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TemplateNotFound(_) | Self::DeploymentNotFound(_) | Self::Database(db::DbError::NotFound) => {
                ErrorClass::NotFound
            }
            Self::Validation { .. } => ErrorClass::Validation,
            Self::UpstreamProvisioning { .. } => ErrorClass::Upstream,
            Self::DeadlineExceeded { .. } => ErrorClass::Timeout,
            Self::InvalidTemplate(_)
            | Self::DuplicateNodeName(_)
            | Self::UnknownConnectionNode { .. }
            | Self::Binding { .. }
            | Self::Consistency(_)
            | Self::Database(_) => ErrorClass::Internal,
        }
    }

    pub(crate) fn validation(requirement: impl Into<String>, missing_fields: Vec<String>) -> Self {
        Self::Validation { requirement: requirement.into(), missing_fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_fields() {
        let err = EngineError::validation("smtp", vec!["smtp_host".into(), "smtp_user".into()]);
        assert_eq!(err.to_string(), "cannot resolve smtp: missing smtp_host, smtp_user");
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    #[test]
    fn upstream_message_carries_status() {
        let err = EngineError::UpstreamProvisioning {
            operation: "credential create",
            status: Some(400),
            message: "bad data".into(),
        };
        assert_eq!(
            err.to_string(),
            "automation service rejected credential create (HTTP 400): bad data"
        );
    }
}
