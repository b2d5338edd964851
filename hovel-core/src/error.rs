pub use anyhow::bail;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HovelError {
    InvalidRequest(String),
    Conflict(String),
    NotFound(String),
    CredentialInvalid(String),
    CredentialTransient(String),
    Vcs(String),
    Template(String),
    UnknownService(String),
    NoServices,
    PortExhausted,
    BuildFailed(String),
    StartFailed(String),
    StopFailed(String),
    QueryFailed(String),
    LogFailed(String),
    NotRunning(String),
    SessionStartFailed(String),
    Timeout(String),
    Io(#[from] std::io::Error),
    Serialization(String),
    Internal(String),
    Other(#[from] anyhow::Error),
}

impl Display for HovelError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            HovelError::InvalidRequest(s) => write!(f, "Invalid request: {}", s),
            HovelError::Conflict(s) => write!(f, "{}", s),
            HovelError::NotFound(s) => write!(f, "Branch {} not found", s),
            HovelError::CredentialInvalid(s) => write!(f, "Invalid Gemini API key: {}", s),
            HovelError::CredentialTransient(s) => {
                write!(f, "Could not validate Gemini API key: {}", s)
            }
            HovelError::Vcs(s) => write!(f, "Git operation failed: {}", s),
            HovelError::Template(s) => write!(f, "Template error: {}", s),
            HovelError::UnknownService(s) => write!(f, "unknown service: {}", s),
            HovelError::NoServices => write!(f, "no services selected"),
            HovelError::PortExhausted => write!(f, "no free port in the branch port range"),
            HovelError::BuildFailed(s) => write!(f, "Build failed: {}", s),
            HovelError::StartFailed(s) => write!(f, "Start failed: {}", s),
            HovelError::StopFailed(s) => write!(f, "Stop failed: {}", s),
            HovelError::QueryFailed(s) => write!(f, "Status query failed: {}", s),
            HovelError::LogFailed(s) => write!(f, "Log retrieval failed: {}", s),
            HovelError::NotRunning(s) => write!(f, "Service {} is not running", s),
            HovelError::SessionStartFailed(s) => write!(f, "Terminal session failed: {}", s),
            HovelError::Timeout(s) => write!(f, "Operation timed out: {}", s),
            HovelError::Io(e) => write!(f, "I/O error: {}", e),
            HovelError::Serialization(s) => write!(f, "Serialization error: {}", s),
            HovelError::Internal(s) => write!(f, "Internal error: {}", s),
            HovelError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl HovelError {
    /// Stable machine-readable code surfaced in API error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            HovelError::InvalidRequest(_) => "invalid_request",
            HovelError::Conflict(_) => "conflict",
            HovelError::NotFound(_) => "not_found",
            HovelError::CredentialInvalid(_) => "credential_invalid",
            HovelError::CredentialTransient(_) => "credential_transient",
            HovelError::Vcs(_) => "vcs_failed",
            HovelError::Template(_) => "template_error",
            HovelError::UnknownService(_) => "unknown_service",
            HovelError::NoServices => "no_services",
            HovelError::PortExhausted => "port_exhausted",
            HovelError::BuildFailed(_) => "build_failed",
            HovelError::StartFailed(_) => "start_failed",
            HovelError::StopFailed(_) => "stop_failed",
            HovelError::QueryFailed(_) => "query_failed",
            HovelError::LogFailed(_) => "log_failed",
            HovelError::NotRunning(_) => "not_running",
            HovelError::SessionStartFailed(_) => "session_start_failed",
            HovelError::Timeout(_) => "timeout",
            HovelError::Io(_) => "io_error",
            HovelError::Serialization(_) => "serialization_error",
            HovelError::Internal(_) => "internal",
            HovelError::Other(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for HovelError {
    fn from(err: serde_json::Error) -> Self {
        HovelError::Serialization(err.to_string())
    }
}

impl From<serde_yaml_ng::Error> for HovelError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        HovelError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HovelError>;
