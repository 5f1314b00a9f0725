//! Error types for the namespace pool.

use thiserror::Error;

/// Errors returned by [`Pool`](crate::Pool) registry operations.
///
/// Store operations themselves are infallible; only name lookups and
/// creation can fail, and neither leaves any partial change behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A namespace with this name is already registered
    #[error("namespace '{name}' already exists")]
    AlreadyExists { name: String },

    /// No namespace with this name is registered
    #[error("namespace '{name}' not found")]
    NotFound { name: String },
}

impl PoolError {
    pub(crate) fn already_exists(name: impl Into<String>) -> Self {
        PoolError::AlreadyExists { name: name.into() }
    }

    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        PoolError::NotFound { name: name.into() }
    }

    /// Returns `true` if a namespace with the requested name already existed.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, PoolError::AlreadyExists { .. })
    }

    /// Returns `true` if the requested namespace was not registered.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PoolError::NotFound { .. })
    }

    /// The namespace name the failed operation was called with.
    pub fn name(&self) -> &str {
        match self {
            PoolError::AlreadyExists { name } | PoolError::NotFound { name } => name,
        }
    }
}

/// Result alias for pool operations.
pub type Result<T, E = PoolError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_helpers() {
        let err = PoolError::already_exists("users");
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
        assert_eq!(err.name(), "users");

        let err = PoolError::not_found("sessions");
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
        assert_eq!(err.name(), "sessions");
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            PoolError::already_exists("a").to_string(),
            "namespace 'a' already exists"
        );
        assert_eq!(PoolError::not_found("b").to_string(), "namespace 'b' not found");
    }
}
