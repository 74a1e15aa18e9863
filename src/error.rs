use std::path::Path;

/// Errors surfaced by this crate.
///
/// Every failure mode crossing the public API is one of these kinds; the
/// underlying git library error is wrapped in [`Error::Git`] rather than
/// leaking its own type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Path or key absent in the snapshot.
    #[error("not found: {0}")]
    NotFound(String),

    /// File operation applied to a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory operation applied to a file or symlink.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Write attempted through a read-only snapshot.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The branch tip moved past this snapshot (CAS pre-image mismatch).
    #[error("stale snapshot: {0}")]
    StaleSnapshot(String),

    /// Named ref absent.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Ref creation collided with an existing name.
    #[error("key already exists: {0}")]
    KeyExists(String),

    /// Path rejected by normalization.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// String is not 40 lowercase hex characters.
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    /// Ref name violates the validation rules.
    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    /// Operation on a batch that has already committed.
    #[error("batch already closed")]
    BatchClosed,

    /// File or lock I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying object-store operation failed.
    #[error("git error: {0}")]
    Git(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn stale_snapshot(msg: impl Into<String>) -> Self {
        Self::StaleSnapshot(msg.into())
    }

    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound(key.into())
    }

    pub fn key_exists(key: impl Into<String>) -> Self {
        Self::KeyExists(key.into())
    }

    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    pub fn invalid_hash(hash: impl Into<String>) -> Self {
        Self::InvalidHash(hash.into())
    }

    pub fn invalid_ref_name(msg: impl Into<String>) -> Self {
        Self::InvalidRefName(msg.into())
    }

    pub fn git(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Git(Box::new(err))
    }

    pub fn git_msg(msg: impl Into<String>) -> Self {
        Self::Git(msg.into().into())
    }

    /// Wrap an I/O error with the path it concerns.
    pub fn io_at(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.as_ref().display(), err),
        ))
    }
}
