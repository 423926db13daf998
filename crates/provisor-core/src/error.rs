//! Error types for directory provisioning operations.
//!
//! Every operation on the account manager surfaces one of these variants. Existence probes
//! translate "not found" into `false` before it reaches this type; everything else propagates
//! unchanged to the caller.

use thiserror::Error;

/// Main error type for provisioning operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Transport or TLS negotiation with the directory failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The directory rejected the bind credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The operation target does not exist
    #[error("No such entry: {0}")]
    NoSuchEntry(String),

    /// An entry (or attribute value) with the same identity already exists
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Attempted to remove a user that is not a member of the group
    #[error("`{member}` is not a member of group `{group}`")]
    NotAMember {
        /// Group that was modified
        group: String,
        /// Username that was expected in the membership set
        member: String,
    },

    /// No identifier is left in the configured range
    #[error("No free {namespace} in range [{min}, {max})")]
    NamespaceExhausted {
        /// Identifier attribute that was scanned (`uidNumber` / `gidNumber`)
        namespace: String,
        /// Inclusive lower bound
        min: u32,
        /// Exclusive upper bound
        max: u32,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Operation timed out
    #[error("Timeout waiting for directory: {0}")]
    Timeout(String),

    /// Password hashing failed
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// Any other non-success result code returned by the directory
    #[error("Directory error (code {code}): {message}")]
    Directory {
        /// LDAP result code
        code: u32,
        /// Diagnostic message from the server
        message: String,
    },
}

/// Specialized result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_ERROR",
            Self::NoSuchEntry(_) => "NO_SUCH_ENTRY",
            Self::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            Self::NotAMember { .. } => "NOT_A_MEMBER",
            Self::NamespaceExhausted { .. } => "NAMESPACE_EXHAUSTED",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Timeout(_) => "TIMEOUT",
            Self::PasswordHash(_) => "PASSWORD_HASH_ERROR",
            Self::Directory { .. } => "DIRECTORY_ERROR",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    ///
    /// Caller mistakes (missing entries, duplicates, non-members) are expected outcomes and are
    /// left to the caller to report.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Authentication(_)
                | Self::NamespaceExhausted { .. }
                | Self::ConfigError(_)
                | Self::Timeout(_)
                | Self::PasswordHash(_)
                | Self::Directory { .. }
        )
    }

    /// Returns true for the "target entry does not exist" condition.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchEntry(_))
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
