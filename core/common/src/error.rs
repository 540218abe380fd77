//! Common error types for Cofre.

use thiserror::Error;

/// Top-level error type for vault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A storage provider or capability failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input failed a precondition.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Secret or recovery answer did not match.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A stored record could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The platform refused access to a capability.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

/// Coarse classification used by hosts to pick user guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Filesystem or provider failure.
    Io,
    /// Expected entity absent.
    NotFound,
    /// Input failed a precondition.
    Validation,
    /// Secret mismatch.
    Auth,
    /// Stored record unreadable.
    Parse,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Storage(_) | Error::AccessDenied(_) | Error::Crypto(_) => {
                ErrorKind::Io
            }
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) | Error::AlreadyExists(_) | Error::Serialization(_) => {
                ErrorKind::Validation
            }
            Error::Auth(_) => ErrorKind::Auth,
            Error::Parse(_) => ErrorKind::Parse,
        }
    }

    /// A short, actionable message for the user.
    pub fn guidance(&self) -> &'static str {
        match self {
            Error::AccessDenied(_) => "Grant the app access in the system settings and try again.",
            Error::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                "Grant the app access in the system settings and try again."
            }
            Error::AlreadyExists(_) => "Pick a different name or remove the existing item first.",
            _ => match self.kind() {
                ErrorKind::Io => "The device could not complete the operation. Check free space and retry.",
                ErrorKind::NotFound => "The item is no longer there. Refresh the list and try again.",
                ErrorKind::Validation => "Check the value you entered and try again.",
                ErrorKind::Auth => "The secret is not correct. Re-enter it or use recovery.",
                ErrorKind::Parse => "A stored entry is damaged and was left untouched.",
            },
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::Storage("x".into()).kind(), ErrorKind::Io);
        assert_eq!(Error::AccessDenied("x".into()).kind(), ErrorKind::Io);
        assert_eq!(Error::AlreadyExists("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::Auth("x".into()).kind(), ErrorKind::Auth);
        assert_eq!(Error::Parse("x".into()).kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_guidance_is_distinct_per_kind() {
        let messages = [
            Error::Storage("x".into()).guidance(),
            Error::NotFound("x".into()).guidance(),
            Error::Validation("x".into()).guidance(),
            Error::Auth("x".into()).guidance(),
            Error::Parse("x".into()).guidance(),
            Error::AccessDenied("x".into()).guidance(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_permission_denied_io_asks_for_access() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(err.guidance(), Error::AccessDenied("x".into()).guidance());
    }
}
