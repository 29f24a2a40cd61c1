//! Compositor error types.

use thiserror::Error;

use crate::backend::BackendError;
use crate::id::IdString;

/// Errors raised while defining, building, validating or running compositors.
///
/// Every error is fatal to the operation that produced it: nothing is retried
/// internally and a failed workspace build leaves no partially wired workspace.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositorError {
    #[error("a {kind} definition named '{name}' already exists")]
    DuplicateName { kind: &'static str, name: String },
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("'{name}' uses the reserved \"global_\" prefix and cannot be a {usage}")]
    ReservedName { name: String, usage: &'static str },
    #[error("global texture '{name}' must start with the \"global_\" prefix")]
    GlobalPrefixRequired { name: String },
    #[error("shadow node '{node}' cannot declare input channel '{channel}'")]
    ShadowNodeInput { node: String, channel: String },
    #[error("shadow node definition '{name}' is incomplete: {reason}")]
    IncompleteDefinition { name: String, reason: String },
    #[error("validation of '{name}' failed: {reason}")]
    Validation { name: String, reason: String },
    #[error("connection graph of workspace '{workspace}' contains a cycle through '{node}'")]
    CyclicGraph { workspace: String, node: String },
    #[error("{kind} definition '{name}' is shared with a live instance")]
    DefinitionInUse { kind: &'static str, name: String },
    #[error("the scene of workspace '{workspace}' was dropped")]
    SceneDropped { workspace: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl CompositorError {
    pub(crate) fn not_found(kind: &'static str, name: IdString) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn validation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True if the render system rejected an attachment combination.
    pub fn is_incompatible_attachment(&self) -> bool {
        matches!(
            self,
            Self::Backend(BackendError::IncompatibleAttachment { .. })
        )
    }
}

pub type CompositorResult<T> = Result<T, CompositorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompositorError::ReservedName {
            name: "global_rt".to_string(),
            usage: "local texture",
        };
        assert_eq!(
            err.to_string(),
            "'global_rt' uses the reserved \"global_\" prefix and cannot be a local texture"
        );
    }

    #[test]
    fn test_backend_error_conversion() {
        let err: CompositorError = BackendError::IncompatibleAttachment {
            attachment: 1,
            reason: "format differs".to_string(),
        }
        .into();
        assert!(err.is_incompatible_attachment());
        assert!(!CompositorError::not_found("node", IdString::new("a")).is_incompatible_attachment());
    }
}
