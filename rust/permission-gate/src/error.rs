//! Error types for the permission gate.
//!
//! None of these escape `PermissionGate::check_permission`: they are folded
//! into a denied [`CheckResult`](crate::gate::CheckResult) with a reason
//! string. `reload` records them in the gate's observable error field.

use thiserror::Error;

/// Permission gate errors.
#[derive(Debug, Error)]
pub enum GateError {
    /// No bearer credential is available; no request was sent.
    #[error("Not authenticated: no access token available")]
    NotAuthenticated,

    /// The credential can't be sent as an `Authorization` header.
    #[error("Invalid access token: not a valid header value")]
    InvalidCredential,

    /// The server rejected the credential (HTTP 401/403).
    #[error("Unauthorized (HTTP {0})")]
    Unauthorized(u16),

    /// Rate limited by server (HTTP 429).
    #[error("Rate limited (HTTP 429)")]
    RateLimited,

    /// Non-success status or `success: false` from the API.
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Non-success status or `success: false` during a permission check.
    #[error("Permission check failed (HTTP {status}): {message}")]
    RemoteCheckFailed { status: u16, message: String },

    /// The authoritative permission list could not be fetched.
    #[error("Failed to reload permissions: {0}")]
    ReloadFailed(#[source] Box<GateError>),

    /// The identity changed while the reload was in flight; its result was dropped.
    #[error("Reload superseded by an identity change")]
    ReloadSuperseded,

    /// Invalid or malformed response from server.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// HTTP client error.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GateError {
    /// Check if error is transient and potentially retry-able.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited | Self::Http(_) => true,
            Self::ServerError { status, .. } | Self::RemoteCheckFailed { status, .. } => {
                (500..600).contains(status)
            }
            Self::ReloadFailed(source) => source.is_transient(),
            Self::NotAuthenticated
            | Self::InvalidCredential
            | Self::Unauthorized(_)
            | Self::ReloadSuperseded
            | Self::InvalidResponse(_)
            | Self::Json(_) => false,
        }
    }

    /// Check if the error stems from missing or rejected credentials.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::NotAuthenticated | Self::InvalidCredential | Self::Unauthorized(_) => true,
            Self::ReloadFailed(source) => source.is_auth(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
