use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

/// Error raised while building a [`ServeDir`](crate::ServeDir).
///
/// These are always fatal and independent of the `fallthrough` policy.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("root path must be provided")]
    MissingRoot,

    #[error("root path {0:?} does not exist")]
    RootNotFound(PathBuf, #[source] std::io::Error),

    #[error("root path {0:?} is not a directory")]
    RootNotDirectory(PathBuf),

    #[error("invalid max-age {0:?}")]
    InvalidMaxAge(String),
}

/// Why a request was refused with `403 Forbidden`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    /// The decoded path climbs above the served root.
    Traversal,
    /// The path contains a dotfile segment and the policy is `deny`.
    Dotfile,
}

/// Why a request was answered with `404 Not Found`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    Missing,
    /// A decoded path segment exceeds the filesystem name length limit.
    NameTooLong,
    /// The path contains a dotfile segment and the policy is `ignore`.
    Dotfile,
    /// A directory was hit but neither an index file nor a redirect applies.
    Directory,
}

/// A request-level failure detected by the engine.
///
/// Each variant maps to exactly one HTTP status, see [`ServeError::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServeError {
    #[error("malformed request path")]
    BadRequest,

    #[error("forbidden: {0:?}")]
    Forbidden(ForbiddenReason),

    #[error("not found: {0:?}")]
    NotFound(NotFoundReason),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::BadRequest => StatusCode::BAD_REQUEST,
            ServeError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServeError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    /// Whether the `fallthrough` policy may turn this error into a pass to the next handler.
    ///
    /// Range and precondition failures concern a resource that does exist, so they stay
    /// terminal.
    pub fn can_fall_through(&self) -> bool {
        !matches!(self, ServeError::RangeNotSatisfiable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ServeError::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServeError::Forbidden(ForbiddenReason::Traversal).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServeError::NotFound(NotFoundReason::NameTooLong).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServeError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ServeError::RangeNotSatisfiable { size: 3 }.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
    }

    #[test]
    fn range_errors_never_fall_through() {
        assert!(ServeError::NotFound(NotFoundReason::Missing).can_fall_through());
        assert!(ServeError::MethodNotAllowed.can_fall_through());
        assert!(!ServeError::RangeNotSatisfiable { size: 0 }.can_fall_through());
    }
}
