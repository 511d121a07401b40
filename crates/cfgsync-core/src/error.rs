//! Error types for reconciliation and its collaborators.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{Digest, Tier};

/// Errors that terminate a reconciliation request.
///
/// Every variant is terminal: there is no internal retry. Callers retry on
/// their own polling schedule.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The requested digest is not a hex-encoded SHA-256.
    #[error("Invalid digest: {value:?} is not 64 hexadecimal characters")]
    InvalidDigest {
        /// The rejected input.
        value: String,
    },

    /// The local artifact could not be read.
    #[error("Failed to read local config {}: {source}", path.display())]
    LocalRead {
        /// The artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The directory has no record of the tenant.
    #[error("Tenant {namespace}/{name} not found ({tier} tier)")]
    TenantNotFound {
        tier: Tier,
        namespace: String,
        name: String,
    },

    /// The tenant declares no configuration secret.
    #[error("Tenant {namespace}/{name} has no configuration set ({tier} tier)")]
    ConfigurationUnset {
        tier: Tier,
        namespace: String,
        name: String,
    },

    /// The configuration secret referenced by the tenant is missing.
    #[error("Configuration secret {namespace}/{name} not found ({tier} tier)")]
    SecretNotFound {
        tier: Tier,
        namespace: String,
        name: String,
    },

    /// The configuration secret holds content that cannot be rendered.
    #[error("Configuration secret {namespace}/{name} is malformed ({tier} tier): {source}")]
    SecretMalformed {
        tier: Tier,
        namespace: String,
        name: String,
        #[source]
        source: MaterializeError,
    },

    /// The rendered configuration lacks root credentials.
    #[error(
        "Root credentials incomplete ({tier} tier): user present={root_user}, password present={root_password}"
    )]
    CredentialsIncomplete {
        tier: Tier,
        root_user: bool,
        root_password: bool,
    },

    /// The cached snapshot backend failed.
    #[error("Snapshot unavailable: {message}")]
    SnapshotUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// The control plane call failed.
    #[error("Control plane call failed: {message}")]
    LiveCallFailed {
        /// Description of the failure.
        message: String,
    },

    /// The control plane call exceeded its deadline.
    #[error("Control plane call timed out after {}ms", timeout.as_millis())]
    LiveCallTimedOut {
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// No known configuration state hashes to the requested digest.
    #[error("Configuration does not match: requested {requested}, canonical is {canonical}")]
    Unresolvable {
        /// Digest the caller asked about.
        requested: Digest,
        /// Digest of the live canonical configuration.
        canonical: Digest,
    },

    /// A match was found but persisting it failed.
    #[error("Failed to write config {}: {source}", path.display())]
    WriteError {
        /// The artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ReconcileError {
    /// Creates a new `InvalidDigest` error.
    #[must_use]
    pub fn invalid_digest(value: impl Into<String>) -> Self {
        Self::InvalidDigest {
            value: value.into(),
        }
    }

    /// Creates a new `TenantNotFound` error.
    #[must_use]
    pub fn tenant_not_found(tier: Tier, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::TenantNotFound {
            tier,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Creates a new `ConfigurationUnset` error.
    #[must_use]
    pub fn configuration_unset(
        tier: Tier,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::ConfigurationUnset {
            tier,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Creates a new `SecretNotFound` error.
    #[must_use]
    pub fn secret_not_found(tier: Tier, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::SecretNotFound {
            tier,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Creates a new `LiveCallFailed` error.
    #[must_use]
    pub fn live_call_failed(message: impl Into<String>) -> Self {
        Self::LiveCallFailed {
            message: message.into(),
        }
    }

    /// Maps a directory backend failure into the error of the tier it
    /// happened at.
    #[must_use]
    pub fn from_directory(tier: Tier, err: DirectoryError) -> Self {
        match tier {
            Tier::Live => Self::LiveCallFailed {
                message: err.to_string(),
            },
            Tier::Cached | Tier::Local => Self::SnapshotUnavailable {
                message: err.to_string(),
            },
        }
    }

    /// Returns `true` if this is an invalid digest error.
    #[must_use]
    pub fn is_invalid_digest(&self) -> bool {
        matches!(self, Self::InvalidDigest { .. })
    }

    /// Returns `true` if the requested digest matched no known state.
    #[must_use]
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::Unresolvable { .. })
    }

    /// The tier the error was raised at, if it is tier-specific.
    #[must_use]
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::LocalRead { .. } | Self::WriteError { .. } => Some(Tier::Local),
            Self::TenantNotFound { tier, .. }
            | Self::ConfigurationUnset { tier, .. }
            | Self::SecretNotFound { tier, .. }
            | Self::SecretMalformed { tier, .. }
            | Self::CredentialsIncomplete { tier, .. } => Some(*tier),
            Self::SnapshotUnavailable { .. } => Some(Tier::Cached),
            Self::LiveCallFailed { .. } | Self::LiveCallTimedOut { .. } | Self::Unresolvable { .. } => {
                Some(Tier::Live)
            }
            Self::InvalidDigest { .. } => None,
        }
    }

    /// Stable machine-readable code for failure reports.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDigest { .. } => "invalid_digest",
            Self::LocalRead { .. } => "local_read_error",
            Self::TenantNotFound { .. } => "tenant_not_found",
            Self::ConfigurationUnset { .. } => "configuration_unset",
            Self::SecretNotFound { .. } => "secret_not_found",
            Self::SecretMalformed { .. } => "secret_malformed",
            Self::CredentialsIncomplete { .. } => "credentials_incomplete",
            Self::SnapshotUnavailable { .. } => "snapshot_unavailable",
            Self::LiveCallFailed { .. } => "live_call_failed",
            Self::LiveCallTimedOut { .. } => "live_call_timed_out",
            Self::Unresolvable { .. } => "unresolvable",
            Self::WriteError { .. } => "write_error",
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDigest { .. } => ErrorCategory::Validation,
            Self::LocalRead { .. } | Self::WriteError { .. } => ErrorCategory::LocalIo,
            Self::TenantNotFound { .. }
            | Self::ConfigurationUnset { .. }
            | Self::SecretNotFound { .. }
            | Self::SecretMalformed { .. }
            | Self::CredentialsIncomplete { .. } => ErrorCategory::ResourceState,
            Self::LiveCallFailed { .. } | Self::LiveCallTimedOut { .. } => {
                ErrorCategory::ControlPlane
            }
            Self::Unresolvable { .. } => ErrorCategory::Mismatch,
            Self::SnapshotUnavailable { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of reconciliation errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed request.
    Validation,
    /// Local filesystem fault.
    LocalIo,
    /// Tenant or secret state missing or malformed.
    ResourceState,
    /// Control plane unreachable or slow.
    ControlPlane,
    /// Requested digest matches no known state.
    Mismatch,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::LocalIo => write!(f, "local_io"),
            Self::ResourceState => write!(f, "resource_state"),
            Self::ControlPlane => write!(f, "control_plane"),
            Self::Mismatch => write!(f, "mismatch"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Errors reported by a resource directory backend.
///
/// Absence of a record is not an error; lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The backend answered with an unexpected status.
    #[error("unexpected status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// The response could not be decoded.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// The backend is not usable.
    #[error("directory unavailable: {message}")]
    Unavailable { message: String },
}

impl DirectoryError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Errors raised while rendering the configuration artifact.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// A secret entry is not valid UTF-8.
    #[error("key {key:?} is not valid UTF-8")]
    InvalidUtf8 { key: String },
}

/// Errors reported by an artifact store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Returns `true` if the artifact does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Read { path, source } => Self::LocalRead { path, source },
            StoreError::Write { path, source } => Self::WriteError { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReconcileError::tenant_not_found(Tier::Cached, "ns", "store");
        assert_eq!(err.to_string(), "Tenant ns/store not found (cached tier)");

        let err = ReconcileError::secret_not_found(Tier::Live, "ns", "store-env");
        assert_eq!(
            err.to_string(),
            "Configuration secret ns/store-env not found (live tier)"
        );

        let err = ReconcileError::LiveCallTimedOut {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Control plane call timed out after 250ms");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            ReconcileError::invalid_digest("x").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            ReconcileError::configuration_unset(Tier::Cached, "ns", "t").category(),
            ErrorCategory::ResourceState
        );
        assert_eq!(
            ReconcileError::live_call_failed("refused").category(),
            ErrorCategory::ControlPlane
        );
        assert_eq!(
            ReconcileError::Unresolvable {
                requested: Digest::of(b"a"),
                canonical: Digest::of(b"b"),
            }
            .category(),
            ErrorCategory::Mismatch
        );
        assert_eq!(ErrorCategory::ResourceState.to_string(), "resource_state");
    }

    #[test]
    fn test_directory_error_maps_by_tier() {
        let live = ReconcileError::from_directory(Tier::Live, DirectoryError::transport("refused"));
        assert_eq!(live.code(), "live_call_failed");
        assert_eq!(live.tier(), Some(Tier::Live));

        let cached =
            ReconcileError::from_directory(Tier::Cached, DirectoryError::unavailable("closed"));
        assert_eq!(cached.code(), "snapshot_unavailable");
    }

    #[test]
    fn test_store_error_conversion() {
        let read = StoreError::Read {
            path: PathBuf::from("/tmp/config.env"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(read.is_not_found());
        let err: ReconcileError = read.into();
        assert_eq!(err.code(), "local_read_error");
        assert_eq!(err.category(), ErrorCategory::LocalIo);

        let write = StoreError::Write {
            path: PathBuf::from("/tmp/config.env"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let err: ReconcileError = write.into();
        assert_eq!(err.code(), "write_error");
    }

    #[test]
    fn test_secret_malformed() {
        let err = ReconcileError::SecretMalformed {
            tier: Tier::Live,
            namespace: "ns".into(),
            name: "store-env".into(),
            source: MaterializeError::InvalidUtf8 {
                key: "config.env".into(),
            },
        };
        assert_eq!(err.code(), "secret_malformed");
        assert_eq!(err.category(), ErrorCategory::ResourceState);
        assert_eq!(err.tier(), Some(Tier::Live));
        assert_eq!(
            err.to_string(),
            "Configuration secret ns/store-env is malformed (live tier): key \"config.env\" is not valid UTF-8"
        );
    }
}
