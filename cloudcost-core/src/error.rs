//! Error types for the cloudcost core library.
//!
//! Every failure the query path can produce is a [`CostError`] variant, and each
//! variant belongs to exactly one [`ErrorKind`]. The HTTP boundary maps kinds to
//! status codes, so a kind must survive propagation unchanged.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Request | Caller input and unknown projects |
//! | E2001-E2099 | Endpoint | Identity, catalog and timeout errors |
//! | E3001-E3099 | Upstream | Rating service contract violations |
//! | E4001-E4099 | Config | Configuration loading and validation |

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

use crate::engine::shapes::ResponseShape;

/// Why a single shape attempt did not produce a usable series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// Connection refused, reset, DNS failure and similar.
    Transport(String),
    /// The attempt exceeded the per-attempt ceiling.
    Timeout(Duration),
    /// 5xx from the rating service.
    ServerError(u16),
    /// 4xx other than auth rejections: the resource does not exist in this deployment.
    UnknownResource(u16),
    /// 2xx whose body is not JSON or does not match the shape layout.
    Unparseable(String),
    /// 2xx matching the layout but carrying invalid cost data.
    Malformed(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Transport(msg) => write!(f, "transport error: {}", msg),
            AttemptFailure::Timeout(limit) => write!(f, "timed out after {:?}", limit),
            AttemptFailure::ServerError(status) => write!(f, "server error (HTTP {})", status),
            AttemptFailure::UnknownResource(status) => {
                write!(f, "resource not available (HTTP {})", status)
            }
            AttemptFailure::Unparseable(msg) => write!(f, "unrecognized body: {}", msg),
            AttemptFailure::Malformed(msg) => write!(f, "malformed cost data: {}", msg),
        }
    }
}

/// Diagnostic record of one shape tried by the strategy chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyAttempt {
    pub shape: ResponseShape,
    pub failure: AttemptFailure,
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.shape.id(), self.failure)
    }
}

/// Coarse classification of a [`CostError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    ProjectNotFound,
    EndpointUnavailable,
    Timeout,
    NoCompatibleEndpoint,
    MalformedResponse,
    UpstreamRequest,
    Config,
}

/// The main error type for the cloudcost core library.
#[derive(Debug, Error)]
pub enum CostError {
    // ========================================================================
    // Request Errors (E1001-E1099)
    // ========================================================================
    /// Bad caller input; never reaches the network
    #[error("[E1001] Invalid request: {0}")]
    InvalidRequest(String),

    /// The identity service reports that the project does not exist
    #[error("[E1002] Project '{0}' does not exist")]
    ProjectNotFound(String),

    // ========================================================================
    // Endpoint Errors (E2001-E2099)
    // ========================================================================
    /// Identity, catalog or credential failure
    #[error("[E2001] Rating endpoint unavailable: {0}")]
    EndpointUnavailable(String),

    /// An operation exceeded its time bound
    #[error("[E2002] Timed out: {0}")]
    Timeout(String),

    // ========================================================================
    // Upstream Errors (E3001-E3099)
    // ========================================================================
    /// Every known response shape was tried and none matched
    #[error("[E3001] No compatible rating endpoint found (tried {})", format_attempts(.attempts))]
    NoCompatibleEndpoint { attempts: Vec<StrategyAttempt> },

    /// A response matched a shape but contained invalid cost data
    #[error("[E3002] Malformed response from {shape}: {message}")]
    MalformedResponse { shape: String, message: String },

    /// A non-query rating API call returned a non-success status
    #[error("[E3003] HTTP {status} calling {url}: {body}")]
    UpstreamRequest { status: u16, url: String, body: String },

    // ========================================================================
    // Configuration Errors (E4001-E4099)
    // ========================================================================
    /// Configuration could not be loaded or failed validation
    #[error("[E4001] Configuration error: {0}")]
    Config(String),
}

fn format_attempts(attempts: &[StrategyAttempt]) -> String {
    if attempts.is_empty() {
        return "no shapes".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for cloudcost operations.
pub type CostResult<T> = Result<T, CostError>;

impl CostError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        CostError::InvalidRequest(message.into())
    }

    pub fn endpoint_unavailable(message: impl Into<String>) -> Self {
        CostError::EndpointUnavailable(message.into())
    }

    pub fn malformed(shape: ResponseShape, message: impl Into<String>) -> Self {
        CostError::MalformedResponse {
            shape: shape.id().to_string(),
            message: message.into(),
        }
    }

    /// A sum of costs left the range `Decimal` can represent.
    pub fn cost_overflow(context: impl Into<String>) -> Self {
        CostError::MalformedResponse {
            shape: "series".to_string(),
            message: format!("cost sum overflows in {}", context.into()),
        }
    }

    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        CostError::Timeout(format!(
            "{} exceeded {} seconds",
            operation.into(),
            limit.as_secs()
        ))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CostError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CostError::ProjectNotFound(_) => ErrorKind::ProjectNotFound,
            CostError::EndpointUnavailable(_) => ErrorKind::EndpointUnavailable,
            CostError::Timeout(_) => ErrorKind::Timeout,
            CostError::NoCompatibleEndpoint { .. } => ErrorKind::NoCompatibleEndpoint,
            CostError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            CostError::UpstreamRequest { .. } => ErrorKind::UpstreamRequest,
            CostError::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            CostError::InvalidRequest(_) => "E1001",
            CostError::ProjectNotFound(_) => "E1002",
            CostError::EndpointUnavailable(_) => "E2001",
            CostError::Timeout(_) => "E2002",
            CostError::NoCompatibleEndpoint { .. } => "E3001",
            CostError::MalformedResponse { .. } => "E3002",
            CostError::UpstreamRequest { .. } => "E3003",
            CostError::Config(_) => "E4001",
        }
    }

    /// Returns true if the failure originates outside this process.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EndpointUnavailable
                | ErrorKind::Timeout
                | ErrorKind::NoCompatibleEndpoint
                | ErrorKind::MalformedResponse
                | ErrorKind::UpstreamRequest
        )
    }

    /// Shapes tried before giving up, when this is a chain exhaustion.
    pub fn attempts(&self) -> &[StrategyAttempt] {
        match self {
            CostError::NoCompatibleEndpoint { attempts } => attempts,
            _ => &[],
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error.
    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            CostError::EndpointUnavailable(_) => {
                Some("Check OS_AUTH_URL and credentials, or set CLOUDKITTY_ENDPOINT")
            }
            CostError::NoCompatibleEndpoint { .. } => {
                Some("The rating service exposes no supported summary API; check rating.shapes")
            }
            CostError::Config(_) => Some("Check cloudcost.toml and the OS_* environment variables"),
            _ => None,
        }
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        if self.is_upstream() {
            warn!(error_code = %code, "Upstream error: {}", self);
        } else {
            error!(error_code = %code, "Error: {}", self);
        }
    }
}

// ============================================================================
// From trait implementations for seamless error propagation
// ============================================================================

impl From<reqwest::Error> for CostError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CostError::Timeout(err.to_string())
        } else {
            CostError::EndpointUnavailable(err.to_string())
        }
    }
}

impl From<config::ConfigError> for CostError {
    fn from(err: config::ConfigError) -> Self {
        CostError::Config(err.to_string())
    }
}

impl From<crate::config::ConfigLoadError> for CostError {
    fn from(err: crate::config::ConfigLoadError) -> Self {
        CostError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CostError::invalid_request("window start must precede end");
        assert!(err.to_string().contains("E1001"));
        assert!(err.to_string().contains("window start"));

        let err = CostError::ProjectNotFound("p1".to_string());
        assert_eq!(err.to_string(), "[E1002] Project 'p1' does not exist");
    }

    #[test]
    fn test_no_compatible_endpoint_lists_attempts() {
        let err = CostError::NoCompatibleEndpoint {
            attempts: vec![
                StrategyAttempt {
                    shape: ResponseShape::SummaryV2,
                    failure: AttemptFailure::UnknownResource(404),
                },
                StrategyAttempt {
                    shape: ResponseShape::ReportSummaryV1,
                    failure: AttemptFailure::ServerError(503),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("v2.summary: resource not available (HTTP 404)"));
        assert!(message.contains("v1.report.summary: server error (HTTP 503)"));
        assert_eq!(err.attempts().len(), 2);
    }

    #[test]
    fn test_kinds_and_codes() {
        let cases = [
            (CostError::invalid_request("x"), ErrorKind::InvalidRequest, "E1001"),
            (
                CostError::endpoint_unavailable("x"),
                ErrorKind::EndpointUnavailable,
                "E2001",
            ),
            (
                CostError::timeout("query", Duration::from_secs(5)),
                ErrorKind::Timeout,
                "E2002",
            ),
            (
                CostError::malformed(ResponseShape::DataframesV2, "bad"),
                ErrorKind::MalformedResponse,
                "E3002",
            ),
            (CostError::Config("x".to_string()), ErrorKind::Config, "E4001"),
        ];

        for (err, kind, code) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.error_code(), code);
        }
    }

    #[test]
    fn test_is_upstream() {
        assert!(CostError::endpoint_unavailable("x").is_upstream());
        assert!(CostError::NoCompatibleEndpoint { attempts: vec![] }.is_upstream());
        assert!(!CostError::invalid_request("x").is_upstream());
        assert!(!CostError::ProjectNotFound("p".to_string()).is_upstream());
    }

    #[test]
    fn test_timeout_message() {
        let err = CostError::timeout("cost query", Duration::from_secs(95));
        assert_eq!(
            err.to_string(),
            "[E2002] Timed out: cost query exceeded 95 seconds"
        );
    }

    #[test]
    fn test_attempts_empty_for_other_kinds() {
        assert!(CostError::invalid_request("x").attempts().is_empty());
    }
}
