use crate::services::project_service::ProjectError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An HTTP-facing error: status code plus the `{error, message?}` JSON body.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: String,
    pub message: Option<String>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    /// Shortcut for a 500 with a generic summary and the underlying cause.
    pub fn internal(summary: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: summary.into(),
            message: Some(cause.to_string()),
        }
    }

    /// Map a service error onto a response. Validation problems become 400,
    /// unknown projects 404; everything else is logged and reported as a 500
    /// under `summary`.
    pub fn from_project(err: ProjectError, summary: &str) -> Self {
        match err {
            ProjectError::NoFiles
            | ProjectError::FileTooLarge { .. }
            | ProjectError::TotalTooLarge { .. }
            | ProjectError::BodyTooLarge { .. }
            | ProjectError::MissingProjectId
            | ProjectError::MissingUpdateFields
            | ProjectError::InvalidUserId(_)
            | ProjectError::InvalidPath(_)
            | ProjectError::ForeignPath { .. } => Self::bad_request(err.to_string()),
            ProjectError::NotFound { .. } => Self::not_found(err.to_string()),
            ProjectError::CorruptRecord { .. }
            | ProjectError::Encode { .. }
            | ProjectError::Store { .. } => {
                tracing::error!("{}: {}", summary, err);
                Self::internal(summary, err)
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.error, message),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.error,
            "status": self.status.as_u16()
        });
        if let Some(message) = self.message {
            body["message"] = message.into();
        }

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::StoreError;
    use crate::services::project_service::StoreStep;

    #[test]
    fn maps_service_errors_to_status_codes() {
        let cases = [
            (ProjectError::NoFiles, StatusCode::BAD_REQUEST),
            (ProjectError::MissingProjectId, StatusCode::BAD_REQUEST),
            (
                ProjectError::NotFound {
                    project_id: "x-1".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ProjectError::Store {
                    step: StoreStep::ListMetadata,
                    completed: 0,
                    source: StoreError::InvalidKey("k".into()),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from_project(err, "Request failed").status, status);
        }
    }

    #[test]
    fn internal_errors_expose_the_cause() {
        let err = AppError::from_project(
            ProjectError::Store {
                step: StoreStep::DeleteMetadata,
                completed: 3,
                source: StoreError::InvalidKey("k".into()),
            },
            "Failed to delete project",
        );
        assert_eq!(err.error, "Failed to delete project");
        assert_eq!(
            err.message.as_deref(),
            Some("deleting project metadata failed after 3 completed content operation(s): invalid store key `k`")
        );
    }
}
