//! Catalogue-level error type.

use thiserror::Error;

/// Errors raised while parsing catalogue identifiers supplied from outside
/// (template tokens, user selector fields, environment variables).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A credential type key that no `CredentialKind` answers to.
    #[error("unknown credential kind: '{0}'")]
    UnknownCredentialKind(String),

    /// A `storage_backend` value outside the supported backends.
    #[error("unknown storage backend: '{0}'")]
    UnknownStorageChoice(String),
}
