//! Structured error taxonomy shared by every component.
//!
//! Components return `Result<T, EngineError>` and propagate with `?`; no
//! component returns a bare `String` or relies on downcasting.

use std::fmt;

/// Coarse classification of an [`EngineError`], used by transports to pick a
/// status code / JSON-RPC error code without matching on the full variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A query was issued against an index with zero indexed files.
    NotIndexed,
    /// A path or identifier does not exist.
    NotFound,
    /// A path is outside every configured root.
    AccessDenied,
    /// Caller-supplied argument is malformed (bad range, bad filter, etc).
    InvalidArgument,
    /// The embedding backend could not be reached after retries.
    BackendUnavailable,
    /// The embedding backend responded but the response violates the contract.
    BackendProtocol,
    /// A persisted structure failed an integrity check at load time.
    IndexCorrupt,
    /// Anything else; never shown to a caller with internal detail attached.
    Internal,
    /// A suspending operation observed its cancellation signal and unwound
    /// before completing; the prior persisted state is unchanged.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotIndexed => "not_indexed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::BackendProtocol => "backend_protocol",
            ErrorKind::IndexCorrupt => "index_corrupt",
            ErrorKind::Internal => "internal",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// The one error type used across the engine.
#[derive(Debug)]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn not_indexed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotIndexed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessDenied, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    pub fn backend_protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendProtocol, message)
    }

    pub fn index_corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IndexCorrupt, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::with_source(ErrorKind::Internal, "metadata store error", e)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::AccessDenied,
            _ => ErrorKind::Internal,
        };
        EngineError::with_source(kind, "io error", e)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
