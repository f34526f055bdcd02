use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProblemError>;

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("Property '{key}' could not be serialized: {message}")]
    PropertySerialization { key: String, message: String },

    #[error("Malformed error document: {message}")]
    MalformedDocument { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    Config { key: String, message: String },

    #[error("Exception handler '{handler}' failed: {message}")]
    HandlerFailed { handler: String, message: String },

    #[error("Response write was cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProblemError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }
}

impl axum::response::IntoResponse for ProblemError {
    fn into_response(self) -> axum::response::Response {
        // Never echo internal detail to the client; only the stable code survives.
        tracing::error!("problemkit internal failure: {}", self);
        let status = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
        let body = serde_json::json!({
            "code": crate::handler::defaults::INTERNAL_ERROR,
            "message": crate::handler::defaults::GENERIC_MESSAGE,
            "status": status.as_u16(),
        });
        (status, axum::Json(body)).into_response()
    }
}
