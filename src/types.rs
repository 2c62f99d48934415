//! Crate-wide error taxonomy and result alias.
//!
//! Registries and the store never catch and hide these errors — they
//! propagate to the dispatch layer, and the transport maps each variant
//! to a status code via [`OcciError::status_code`].

use thiserror::Error;

/// Error types surfaced by the classification and dispatch engine
#[derive(Debug, Error)]
pub enum OcciError {
    /// A category with the same (scheme, term) identity is already defined
    #[error("duplicate category: {0}")]
    DuplicateCategory(String),

    /// Unknown category, backend, identifier, or codec
    #[error("not found: {0}")]
    NotFound(String),

    /// Identifier collision or a registry state conflict
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing or invalid required fields/relations on an entity
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// The action is not declared by the entity's kind or mixins
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// The entity's current state does not permit the action
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed wire payload or unknown category reference
    #[error("parsing error: {0}")]
    Parsing(String),

    /// No codec bound for the requested media type and no default configured
    #[error("no codec for media type: {0}")]
    NoCodec(String),

    /// Opaque failure surfaced by a pluggable backend
    #[error("backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

impl OcciError {
    /// Transport-level status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            OcciError::Parsing(_)
            | OcciError::InvalidEntity(_)
            | OcciError::UnsupportedAction(_)
            | OcciError::InvalidState(_)
            | OcciError::NoCodec(_) => 400,
            OcciError::NotFound(_) => 404,
            OcciError::Conflict(_) | OcciError::DuplicateCategory(_) => 409,
            OcciError::Backend(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, OcciError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(OcciError::Parsing("bad".into()).status_code(), 400);
        assert_eq!(OcciError::InvalidEntity("x".into()).status_code(), 400);
        assert_eq!(OcciError::NotFound("x".into()).status_code(), 404);
        assert_eq!(OcciError::Conflict("x".into()).status_code(), 409);
        assert_eq!(OcciError::DuplicateCategory("x".into()).status_code(), 409);
        assert_eq!(
            OcciError::Backend(anyhow::anyhow!("scheduler down")).status_code(),
            500
        );
    }
}
