use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No code provided")]
    MissingCode,
    #[error("Invalid request body")]
    MalformedBody,
    #[error("processId must be a UUID")]
    InvalidProcessId,
    #[error("Code contains potentially harmful operations that are not allowed in this environment")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("processId is already in use")]
    SessionConflict,
    #[error("Server error: Could not create temporary file")]
    ScratchWrite(#[source] anyhow::Error),
    #[error("Server error: Could not execute Python")]
    Spawn(#[source] std::io::Error),
    #[error("Server error: Python execution failed")]
    ProcessIo { output: String },
    #[error("Server error: Failed to load {0}")]
    Lookup(&'static str, #[source] anyhow::Error),
    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCode | ApiError::MalformedBody | ApiError::InvalidProcessId => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SessionConflict => StatusCode::CONFLICT,
            ApiError::ScratchWrite(_)
            | ApiError::Spawn(_)
            | ApiError::ProcessIo { .. }
            | ApiError::Lookup(..)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::ScratchWrite(e) | ApiError::Lookup(_, e) | ApiError::Internal(e) => {
                error!(error = ?e, "{}", self);
            }
            ApiError::Spawn(e) => error!(error = %e, "{}", self),
            _ => {}
        }

        let body = match self {
            ApiError::ProcessIo { ref output } => json!({ "error": self.to_string(), "output": output }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Uniform body for anything that escaped classification, panics included.
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal Server Error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(ApiError::MissingCode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("Tutorial").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::ProcessIo { output: "broken pipe".into() }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("secret path /srv/x"));
        assert_eq!(err.to_string(), "Internal Server Error");
        let err = ApiError::Lookup("tutorial", anyhow::anyhow!("parsing /srv/data"));
        assert_eq!(err.to_string(), "Server error: Failed to load tutorial");
    }

    #[tokio::test]
    async fn runtime_failure_body_carries_the_output() {
        let response = ApiError::ProcessIo { output: "pipe closed".into() }.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({ "error": "Server error: Python execution failed", "output": "pipe closed" })
        );
    }
}
