use serde::Serialize;
use thiserror::Error;

/// Central error type for the securemaestro-core crate.
#[derive(Debug, Error)]
pub enum MaestroError {
    // Request rejected by the validation gate
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    // Resource caps
    #[error("Source too large (limit {limit_bytes} bytes)")]
    SourceTooLarge { limit_bytes: u64 },

    #[error("Source too long ({duration_sec:.0}s). Cap is {limit_sec}s")]
    SourceTooLong { duration_sec: f64, limit_sec: u64 },

    #[error("Acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("{tool} error: {diagnostic}")]
    ExternalToolError { tool: String, diagnostic: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Stable error category, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    PolicyViolation,
    SourceTooLarge,
    SourceTooLong,
    AcquisitionFailed,
    ExternalToolError,
    InvalidParameter,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PolicyViolation => "POLICY_VIOLATION",
            ErrorKind::SourceTooLarge => "SOURCE_TOO_LARGE",
            ErrorKind::SourceTooLong => "SOURCE_TOO_LONG",
            ErrorKind::AcquisitionFailed => "ACQUISITION_FAILED",
            ErrorKind::ExternalToolError => "EXTERNAL_TOOL_ERROR",
            ErrorKind::InvalidParameter => "INVALID_PARAMETER",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl MaestroError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MaestroError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            MaestroError::SourceTooLarge { .. } => ErrorKind::SourceTooLarge,
            MaestroError::SourceTooLong { .. } => ErrorKind::SourceTooLong,
            MaestroError::AcquisitionFailed(_) => ErrorKind::AcquisitionFailed,
            MaestroError::ExternalToolError { .. } => ErrorKind::ExternalToolError,
            MaestroError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            MaestroError::Io(_) | MaestroError::Anyhow(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn policy(msg: impl Into<String>) -> Self {
        MaestroError::PolicyViolation(msg.into())
    }
}

// --- Implement From conversions for common errors ---
impl From<hound::Error> for MaestroError {
    fn from(e: hound::Error) -> Self {
        MaestroError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for MaestroError {
    fn from(e: serde_json::Error) -> Self {
        MaestroError::Anyhow(e.into())
    }
}

impl From<symphonia::core::errors::Error> for MaestroError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        MaestroError::Anyhow(e.into())
    }
}

pub type Result<T> = std::result::Result<T, MaestroError>;
