use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Context service unavailable: {0}")]
    ContextServiceUnavailable(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream returned {status}: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("Upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn context_unavailable(msg: impl Into<String>) -> Self {
        Self::ContextServiceUnavailable(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamError {
            status,
            body: body.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::UpstreamProtocol(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable name, used in API error bodies and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::ContextServiceUnavailable(_) => "context_service_unavailable",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamError { .. } => "upstream_error",
            Self::UpstreamProtocol(_) => "upstream_protocol_error",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_display_carries_status_and_body() {
        let err = DomainError::upstream(429, "rate limited");
        assert_eq!(err.to_string(), "Upstream returned 429: rate limited");
        assert_eq!(err.kind(), "upstream_error");
    }

    #[test]
    fn test_kinds_are_distinct() {
        let kinds = [
            DomainError::invalid("x").kind(),
            DomainError::not_found("x").kind(),
            DomainError::context_unavailable("x").kind(),
            DomainError::unavailable("x").kind(),
            DomainError::upstream(500, "x").kind(),
            DomainError::protocol("x").kind(),
            DomainError::timeout("x").kind(),
            DomainError::storage("x").kind(),
            DomainError::internal("x").kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
