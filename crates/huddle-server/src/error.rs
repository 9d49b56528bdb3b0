use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use huddle_store::StoreError;

/// Every handler returns `Result<T, ServerError>`. Client-facing variants
/// carry their message to the caller; storage and internal failures are
/// logged in full and answered with a generic message.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict {
        message: String,
        duplicates: Vec<String>,
    },

    /// A task batch reused names already present in the group. Answered as a
    /// bad request that still lists the offending names.
    #[error("{message}")]
    DuplicateNames {
        message: String,
        duplicates: Vec<String>,
    },

    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServerError::NotFound("Record not found".into()),
            StoreError::UnknownUser(name) => ServerError::NotFound(format!("User not found: {name}")),
            StoreError::DuplicateUsername(name) => ServerError::Conflict {
                message: "Username already exists".into(),
                duplicates: vec![name],
            },
            StoreError::DuplicateTasks(names) => ServerError::DuplicateNames {
                message: format!("Already existing task names: {}", names.join(", ")),
                duplicates: names,
            },
            e @ StoreError::WrongChatKind { .. } => ServerError::BadRequest(e.to_string()),
            other => ServerError::Storage(other),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": self.to_string() }),
            ),
            ServerError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": message }),
            ),
            ServerError::Conflict {
                message,
                duplicates,
            } => (
                StatusCode::CONFLICT,
                serde_json::json!({ "error": message, "duplicates": duplicates }),
            ),
            ServerError::DuplicateNames {
                message,
                duplicates,
            } => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": message, "duplicates": duplicates }),
            ),
            ServerError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Database error" }),
                )
            }
            ServerError::Internal(message) => {
                tracing::error!(message = %message, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
