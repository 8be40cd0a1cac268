//! Error types shared across Study Creator crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CreatorError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreatorError {
    /// A stored fingerprint that is not 64 lowercase hex characters
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),
}
