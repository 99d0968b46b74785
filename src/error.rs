use thiserror::Error;

/// Error returned by the provisioning strategies.
///
/// Every variant maps onto one status code of the front end's wire protocol
/// (see [`ProvisionError::code`]). Collaborator failures are classified at the
/// point of the call and never re-classified further up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisionError {
    /// Status code name as understood by the calling orchestrator
    pub fn code(&self) -> &'static str {
        match self {
            ProvisionError::InvalidArgument(_) => "InvalidArgument",
            ProvisionError::Unauthenticated(_) => "Unauthenticated",
            ProvisionError::AlreadyExists(_) => "AlreadyExists",
            ProvisionError::NotFound(_) => "NotFound",
            ProvisionError::Internal(_) => "Internal",
        }
    }

    /// Message without the code prefix
    pub fn message(&self) -> &str {
        match self {
            ProvisionError::InvalidArgument(m)
            | ProvisionError::Unauthenticated(m)
            | ProvisionError::AlreadyExists(m)
            | ProvisionError::NotFound(m)
            | ProvisionError::Internal(m) => m,
        }
    }

    pub(crate) fn internal(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        ProvisionError::Internal(format!("{}: {}", context, err))
    }
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_names() {
        assert_eq!(
            ProvisionError::InvalidArgument("x".into()).code(),
            "InvalidArgument"
        );
        assert_eq!(ProvisionError::Unauthenticated("x".into()).code(), "Unauthenticated");
        assert_eq!(ProvisionError::AlreadyExists("x".into()).code(), "AlreadyExists");
        assert_eq!(ProvisionError::NotFound("x".into()).code(), "NotFound");
        assert_eq!(ProvisionError::Internal("x".into()).code(), "Internal");
    }

    #[test]
    fn test_internal_helper_formats_context() {
        let err = ProvisionError::internal("Could not unmount \"/tmp/x\"", "device busy");
        assert_eq!(err.message(), "Could not unmount \"/tmp/x\": device busy");
        assert_eq!(
            err.to_string(),
            "Internal error: Could not unmount \"/tmp/x\": device busy"
        );
    }
}
