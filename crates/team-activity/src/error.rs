//! Error types for activity collection.

use thiserror::Error;

use crate::models::Source;

/// Errors raised by a single activity source while fetching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Provider unreachable, timed out, or rejected the credentials
    #[error("{provider} is unavailable: {message}")]
    Unavailable { provider: Source, message: String },

    /// Provider answered but the response had an unexpected shape
    #[error("{provider} returned an unexpected response: {message}")]
    Response { provider: Source, message: String },
}

impl SourceError {
    pub fn unavailable(provider: Source, message: impl Into<String>) -> Self {
        Self::Unavailable {
            provider,
            message: message.into(),
        }
    }

    pub fn response(provider: Source, message: impl Into<String>) -> Self {
        Self::Response {
            provider,
            message: message.into(),
        }
    }

    /// The source that produced this error.
    #[must_use]
    pub const fn provider(&self) -> Source {
        match self {
            Self::Unavailable { provider, .. } | Self::Response { provider, .. } => *provider,
        }
    }
}

/// Errors that end a report run.
#[derive(Debug, Error)]
pub enum ActivityError {
    /// No team with this slug in the registry
    #[error("unknown team '{0}'")]
    UnknownTeam(String),

    /// Every source failed; the first failure is reported
    #[error(transparent)]
    Source(#[from] SourceError),

    /// One source failed while another succeeded
    #[error("activity from {provider} could not be collected: {cause}")]
    PartialSourceFailure {
        provider: Source,
        #[source]
        cause: SourceError,
    },

    /// Lookback exceeds what the providers can answer
    #[error("a {days}-day window exceeds the supported maximum of {max_days} days")]
    WindowTooLarge { days: u32, max_days: u32 },

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl ActivityError {
    /// Process exit code for this error kind.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 1,
            Self::UnknownTeam(_) => 3,
            Self::Source(SourceError::Unavailable { .. }) => 4,
            Self::Source(SourceError::Response { .. }) => 5,
            Self::PartialSourceFailure { .. } => 6,
            Self::WindowTooLarge { .. } => 7,
        }
    }
}
