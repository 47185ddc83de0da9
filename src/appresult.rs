use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Reasons an operation is refused before anything goes over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    EmptyBody,
    NoActiveConversation,
    SendInFlight,
    UnknownMessage,
    ProvisionalTarget,
    EmptyEmoji,
}

impl Validation {
    pub fn as_str(&self) -> &'static str {
        use Validation::*;
        match self {
            EmptyBody => "message body is empty",
            NoActiveConversation => "no conversation is open",
            SendInFlight => "a send is already outstanding for this conversation",
            UnknownMessage => "message is not in the open conversation",
            ProvisionalTarget => "message has not been confirmed yet",
            EmptyEmoji => "emoji is empty",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("network failure: {0:#}")]
    Network(anyhow::Error),

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("{}", .0.as_str())]
    Validation(Validation),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl AppError {
    /// Transport failures and server rejections, which callers treat the same way.
    pub fn is_soft_failure(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::Protocol(_) | AppError::Rejected(_))
    }

    pub fn validation(&self) -> Option<Validation> {
        match self {
            AppError::Validation(reason) => Some(*reason),
            _ => None,
        }
    }

    fn status(&self) -> StatusCode {
        use AppError::*;
        match self {
            Validation(_) | BadRequest(_) => StatusCode::BAD_REQUEST,
            NotFound(_) => StatusCode::NOT_FOUND,
            Rejected(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }

        (
            self.status(),
            Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

impl From<Validation> for AppError {
    fn from(reason: Validation) -> Self {
        Self::Validation(reason)
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self::Protocol(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self::Protocol(err.to_owned())
    }
}

macro_rules! apperr_impl {
    ($E:ty => Protocol) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Protocol(err.to_string())
            }
        }
    };
    ($E:ty => $variant:ident) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::$variant(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(reqwest::Error => Network);
apperr_impl!(serde_json::Error => Protocol);
apperr_impl!(sqlx::Error => Internal);
apperr_impl!(time::error::ComponentRange => Internal);
apperr_impl!(std::io::Error => Internal);
