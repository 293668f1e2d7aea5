//! Unified error types for Agora

use std::time::Duration;
use thiserror::Error;

/// Low-level failure mode of a network call that never produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Reset,
    Other,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connect"),
            Self::Reset => write!(f, "connection reset"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Unified error type for all Agora operations
#[derive(Error, Debug)]
pub enum AgoraError {
    // Host platform errors
    #[error("GitHub API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        /// Value of `x-ratelimit-remaining`, when the response carried it
        rate_limit_remaining: Option<u64>,
        /// Value of `retry-after`, when the response carried it
        retry_after: Option<Duration>,
    },

    #[error("Network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // Governance errors
    #[error("Governance error: {0}")]
    Governance(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl AgoraError {
    /// Shorthand for an API error without rate-limit metadata
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            rate_limit_remaining: None,
            retry_after: None,
        }
    }

    /// HTTP status, for API errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The resource no longer exists (deleted or transferred issue)
    pub fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404) | Some(410))
    }

    /// Primary or secondary rate limit.
    ///
    /// GitHub reports secondary limits as 403 with a `retry-after` header and
    /// primary limits as 403/429 with `x-ratelimit-remaining: 0`.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Api { status: 429, .. } => true,
            Self::Api {
                status: 403,
                rate_limit_remaining,
                retry_after,
                ..
            } => *rate_limit_remaining == Some(0) || retry_after.is_some(),
            _ => false,
        }
    }

    /// Permission denied (a 403 that is not a rate limit)
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403) && !self.is_rate_limited()
    }

    /// Gateway failures and dropped connections, worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => matches!(status, 502..=504),
            Self::Network { kind, .. } => !matches!(kind, NetworkErrorKind::Other),
            _ => false,
        }
    }

    /// Server-provided wait hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias using AgoraError
pub type Result<T> = std::result::Result<T, AgoraError>;
