//! Engine error types

use thiserror::Error;

/// Engine error with classification and an optional actionable hint
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: Option<String>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn source_map_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceMapUnavailable, message)
    }

    pub fn devtools_required(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DevtoolsRequired, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    pub fn session_terminated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionTerminated, message)
    }

    pub fn upstream_http(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamHttp, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Error classification surfaced to the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input failed schema validation
    InvalidArgument,
    /// Selector, module, or symbol not present
    NotFound,
    /// Source map missing or malformed for a resolution
    SourceMapUnavailable,
    /// Framework introspection needs an in-page hook that is absent
    DevtoolsRequired,
    /// Deadline exceeded
    Timeout,
    /// Session pool saturated
    ResourceExhausted,
    /// Page or browser crashed mid-call
    SessionTerminated,
    /// Fetching a source map or source file failed with a non-2xx status
    UpstreamHttp,
    /// Unexpected invariant violation
    Internal,
}

impl ErrorKind {
    /// Stable wire name for the protocol layer
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::SourceMapUnavailable => "SourceMapUnavailable",
            Self::DevtoolsRequired => "DevtoolsRequired",
            Self::Timeout => "Timeout",
            Self::ResourceExhausted => "ResourceExhausted",
            Self::SessionTerminated => "SessionTerminated",
            Self::UpstreamHttp => "UpstreamHttp",
            Self::Internal => "Internal",
        }
    }
}

impl From<chromiumoxide::error::CdpError> for EngineError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        EngineError::session_terminated(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::invalid_argument(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ErrorKind::InvalidArgument.as_str(), "InvalidArgument");
        assert_eq!(ErrorKind::SessionTerminated.as_str(), "SessionTerminated");
    }

    #[test]
    fn hint_is_attached() {
        let e = EngineError::not_found("no manifest").with_hint("set PROJECT_ROOT");
        assert_eq!(e.kind, ErrorKind::NotFound);
        assert_eq!(e.hint.as_deref(), Some("set PROJECT_ROOT"));
    }
}
