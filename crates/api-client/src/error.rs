use reqwest::StatusCode;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure taxonomy surfaced by the dispatcher.
///
/// Every variant carries one human-readable message produced by the error
/// normalizer, so callers can branch on the kind and display the text without
/// ever inspecting backend payload shapes themselves.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received at all.
    #[error("network error: {message}")]
    Network { message: String },

    /// A 401 whose recovery (one token refresh and one retry) also failed.
    /// Terminal for the session: credentials have been cleared and the caller
    /// is expected to force a re-login.
    #[error("authentication expired")]
    AuthenticationExpired,

    /// Non-401 client rejection, typically a structured validation response.
    #[error("{message}")]
    Validation { status: StatusCode, message: String },

    /// Server-side failure (5xx) or a response of unrecognized shape.
    #[error("{message}")]
    Server { status: StatusCode, message: String },
}

impl ApiError {
    pub fn is_authentication_expired(&self) -> bool {
        matches!(self, Self::AuthenticationExpired)
    }

    /// The normalized, user-presentable message.
    pub fn message(&self) -> &str {
        match self {
            Self::Network { message }
            | Self::Validation { message, .. }
            | Self::Server { message, .. } => message,
            Self::AuthenticationExpired => "authentication expired",
        }
    }

    /// HTTP status of the failed call, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Network { .. } => None,
            Self::AuthenticationExpired => Some(StatusCode::UNAUTHORIZED),
        }
    }
}
