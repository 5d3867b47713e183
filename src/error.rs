//! Error taxonomy for the installation directory manager.

use std::fmt;

/// The kinds of failure an operation against an installation can report.
///
/// Message text is not part of the stable contract; callers that need to
/// branch on failure class should match on [`Error::kind`] rather than
/// string-matching `Display` output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A ref, checksum, commit, metadata entry, or override file was not found.
    #[error("{context}: not found: {detail}")]
    NotFound {
        /// Operation context prefix, e.g. "While pulling REF from REMOTE".
        context: String,
        /// Human-readable detail.
        detail: String,
    },

    /// The requested ref has no deployed checkout.
    #[error("{context}: not deployed")]
    NotDeployed {
        /// Operation context prefix.
        context: String,
    },

    /// The checksum is already deployed for this ref.
    #[error("{context}: already deployed")]
    AlreadyDeployed {
        /// Operation context prefix.
        context: String,
    },

    /// The checksum was already undeployed (no checkout directory exists).
    #[error("{context}: already undeployed")]
    AlreadyUndeployed {
        /// Operation context prefix.
        context: String,
    },

    /// A structured artifact (ref, commit, tree, key-value file, filez header)
    /// failed to parse.
    #[error("{context}: parse error: {detail}")]
    Parse {
        /// Operation context prefix.
        context: String,
        /// Human-readable detail.
        detail: String,
    },

    /// An export violated naming or content policy.
    #[error("{context}: policy violation: {detail}")]
    PolicyViolation {
        /// Operation context prefix.
        context: String,
        /// Human-readable detail.
        detail: String,
    },

    /// An underlying filesystem or network operation failed.
    #[error("{context}: {source}")]
    Io {
        /// Operation context prefix.
        context: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// A URI scheme other than `file`, `http`, `https` was requested.
    #[error("{context}: unsupported URI scheme: {scheme}")]
    Unsupported {
        /// Operation context prefix.
        context: String,
        /// The offending scheme.
        scheme: String,
    },

    /// The operation was cancelled via a [`crate::cancel::Cancellable`].
    #[error("{context}: cancelled")]
    Cancelled {
        /// Operation context prefix.
        context: String,
    },
}

/// Discriminant for [`Error`], for callers that want to branch without
/// matching the full enum (and its `String` payloads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::NotFound`].
    NotFound,
    /// See [`Error::NotDeployed`].
    NotDeployed,
    /// See [`Error::AlreadyDeployed`].
    AlreadyDeployed,
    /// See [`Error::AlreadyUndeployed`].
    AlreadyUndeployed,
    /// See [`Error::Parse`].
    Parse,
    /// See [`Error::PolicyViolation`].
    PolicyViolation,
    /// See [`Error::Io`].
    Io,
    /// See [`Error::Unsupported`].
    Unsupported,
    /// See [`Error::Cancelled`].
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::NotDeployed => "not-deployed",
            ErrorKind::AlreadyDeployed => "already-deployed",
            ErrorKind::AlreadyUndeployed => "already-undeployed",
            ErrorKind::Parse => "parse-error",
            ErrorKind::PolicyViolation => "policy-violation",
            ErrorKind::Io => "io-error",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl Error {
    /// The discriminant of this error, for callers that want to branch on
    /// failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::NotDeployed { .. } => ErrorKind::NotDeployed,
            Error::AlreadyDeployed { .. } => ErrorKind::AlreadyDeployed,
            Error::AlreadyUndeployed { .. } => ErrorKind::AlreadyUndeployed,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            Error::Io { .. } => ErrorKind::Io,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn not_found(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::NotFound {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn parse(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Parse {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn policy(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::PolicyViolation {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: anyhow::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
