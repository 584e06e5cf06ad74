use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Machine-readable error category carried on every error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InvalidInput,
    Conflict,
    DependencyFailure,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{operation} is not allowed while the attempt is {status}: {detail}")]
    InvalidState {
        operation: &'static str,
        status: String,
        detail: String,
    },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("question {question_id} does not belong to assessment {assessment_id}")]
    QuestionNotInAssessment {
        question_id: String,
        assessment_id: String,
    },

    #[error("identity {identity_id} already has an active attempt for assessment {assessment_id}")]
    DuplicateActiveAttempt {
        identity_id: String,
        assessment_id: String,
        active_attempt_id: String,
    },

    #[error("attempt answer {attempt_answer_id} has already been reviewed")]
    AlreadyReviewed { attempt_answer_id: String },

    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid_state(
        operation: &'static str,
        status: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        EngineError::InvalidState {
            operation,
            status: status.into(),
            detail: detail.into(),
        }
    }

    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::InvalidState { .. } => ErrorKind::InvalidState,
            EngineError::InvalidInput { .. } | EngineError::QuestionNotInAssessment { .. } => {
                ErrorKind::InvalidInput
            }
            EngineError::DuplicateActiveAttempt { .. } | EngineError::AlreadyReviewed { .. } => {
                ErrorKind::Conflict
            }
            EngineError::Dependency(_) => ErrorKind::DependencyFailure,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::DependencyFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured payload for errors a client can act on.
    fn details(&self) -> serde_json::Value {
        match self {
            EngineError::DuplicateActiveAttempt {
                active_attempt_id, ..
            } => json!({ "active_attempt_id": active_attempt_id }),
            EngineError::InvalidState { status, .. } => json!({ "attempt_status": status }),
            _ => serde_json::Value::Null,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Dependency failures are logged server-side and returned opaque.
        let message = match &self {
            EngineError::Dependency(err) => {
                tracing::error!(error = ?err, "Dependency failure");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "message": message,
            "kind": self.kind(),
            "status": status.as_u16(),
            "details": self.details(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_status_codes() {
        assert_eq!(
            EngineError::not_found("attempt", "a1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::invalid_state("finalize", "IN_PROGRESS", "not submitted").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            EngineError::invalid_input("identity_id", "must not be empty").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::DuplicateActiveAttempt {
                identity_id: "s1".into(),
                assessment_id: "q1".into(),
                active_attempt_id: "a1".into(),
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::Dependency(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn duplicate_attempt_carries_the_resume_id() {
        let err = EngineError::DuplicateActiveAttempt {
            identity_id: "s1".into(),
            assessment_id: "q1".into(),
            active_attempt_id: "attempt-42".into(),
        };
        assert_eq!(err.details()["active_attempt_id"], "attempt-42");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
