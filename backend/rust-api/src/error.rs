use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::content::EntityKind;
use crate::store::StoreError;

/// Everything a content operation can be rejected with.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContentError {
    #[error("{kind} field '{field}' is required")]
    MissingField {
        kind: EntityKind,
        field: String,
        id: Option<String>,
    },

    #[error("{kind} field '{field}' is invalid: {reason}")]
    InvalidField {
        kind: EntityKind,
        field: String,
        reason: String,
    },

    #[error("Question '{question_id}' is invalid: {reason}")]
    InvalidQuestion {
        question_id: String,
        field: String,
        reason: String,
    },

    #[error("{kind} references missing {parent_kind} '{parent_id}' via '{field}'")]
    MissingParent {
        kind: EntityKind,
        field: String,
        parent_kind: EntityKind,
        parent_id: String,
    },

    #[error("{kind} with id '{id}' already exists")]
    DuplicateId { kind: EntityKind, id: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("Transaction failed: {reason}")]
    Transaction {
        reason: String,
        cause: TransactionCause,
    },
}

/// Why a transaction did not commit. Nothing it wrote is visible in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionCause {
    /// Lost a race with a concurrent writer; safe to rerun as is.
    Conflict,
    Store,
    Deadline,
}

impl ContentError {
    pub fn missing_field(kind: EntityKind, field: impl Into<String>) -> Self {
        ContentError::MissingField {
            kind,
            field: field.into(),
            id: None,
        }
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        ContentError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn transaction(reason: impl Into<String>) -> Self {
        ContentError::Transaction {
            reason: reason.into(),
            cause: TransactionCause::Store,
        }
    }

    /// Raised only before commit starts, so nothing of the unit was written and
    /// the same request can be sent again.
    pub fn deadline_exceeded(operation: &str, deadline_ms: u64) -> Self {
        ContentError::Transaction {
            reason: format!(
                "{} exceeded the {}ms deadline and was rolled back",
                operation, deadline_ms
            ),
            cause: TransactionCause::Deadline,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ContentError::Transaction {
                cause: TransactionCause::Conflict,
                ..
            }
        )
    }

    /// Error family the admin UI branches on.
    pub fn category(&self) -> &'static str {
        match self {
            ContentError::MissingField { .. }
            | ContentError::InvalidField { .. }
            | ContentError::InvalidQuestion { .. } => "ValidationError",
            ContentError::MissingParent { .. } => "ReferenceError",
            ContentError::DuplicateId { .. } => "ConflictError",
            ContentError::NotFound { .. } => "NotFoundError",
            ContentError::Transaction { .. } => "TransactionError",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ContentError::MissingField { .. } => "MissingField",
            ContentError::InvalidField { .. } => "InvalidField",
            ContentError::InvalidQuestion { .. } => "InvalidQuestion",
            ContentError::MissingParent { .. } => "MissingParent",
            ContentError::DuplicateId { .. } => "DuplicateId",
            ContentError::NotFound { .. } => "NotFound",
            ContentError::Transaction { cause, .. } => match cause {
                TransactionCause::Conflict => "WriteConflict",
                TransactionCause::Store => "TransactionFailed",
                TransactionCause::Deadline => "DeadlineExceeded",
            },
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            ContentError::MissingField { field, .. }
            | ContentError::InvalidField { field, .. }
            | ContentError::InvalidQuestion { field, .. }
            | ContentError::MissingParent { field, .. } => Some(field),
            ContentError::DuplicateId { .. } | ContentError::NotFound { .. } => Some("id"),
            ContentError::Transaction { .. } => None,
        }
    }

    /// The id the failure is about, so the UI can highlight the right row.
    pub fn offending_id(&self) -> Option<&str> {
        match self {
            ContentError::MissingField { id, .. } => id.as_deref(),
            ContentError::InvalidQuestion { question_id, .. } => Some(question_id),
            ContentError::MissingParent { parent_id, .. } => Some(parent_id),
            ContentError::DuplicateId { id, .. } | ContentError::NotFound { id, .. } => Some(id),
            ContentError::InvalidField { .. } | ContentError::Transaction { .. } => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ContentError::Transaction { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ContentError::MissingField { .. }
            | ContentError::InvalidField { .. }
            | ContentError::InvalidQuestion { .. } => StatusCode::BAD_REQUEST,
            ContentError::MissingParent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ContentError::DuplicateId { .. } => StatusCode::CONFLICT,
            ContentError::NotFound { .. } => StatusCode::NOT_FOUND,
            ContentError::Transaction {
                cause: TransactionCause::Deadline,
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            ContentError::Transaction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.category().to_string(),
            code: self.code().to_string(),
            field: self.field().map(str::to_string),
            id: self.offending_id().map(str::to_string),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

impl From<StoreError> for ContentError {
    fn from(err: StoreError) -> Self {
        let cause = if err.is_transient() {
            TransactionCause::Conflict
        } else {
            TransactionCause::Store
        };
        ContentError::Transaction {
            reason: err.to_string(),
            cause,
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message: String,
    pub retryable: bool,
}

impl ErrorBody {
    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        Self {
            kind: "ValidationError".to_string(),
            code: code.to_string(),
            field: None,
            id: None,
            message: message.into(),
            retryable: false,
        }
    }
}

/// HTTP-facing error used by all handlers.
#[derive(Debug)]
pub enum ApiError {
    Content(ContentError),
    BadRequest(ErrorBody),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        ApiError::BadRequest(ErrorBody::bad_request(code, message))
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        ApiError::Content(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|f| f.to_string());
        let mut body = ErrorBody::bad_request("InvalidField", errors.to_string());
        body.field = field;
        ApiError::BadRequest(body)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Content(err) => {
                if err.is_retryable() {
                    tracing::error!("Content operation failed: {}", err);
                } else {
                    tracing::debug!("Content operation rejected: {}", err);
                }
                (err.status_code(), err.body())
            }
            ApiError::BadRequest(body) => (StatusCode::BAD_REQUEST, body),
            ApiError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        kind: "InternalError".to_string(),
                        code: "Internal".to_string(),
                        field: None,
                        id: None,
                        message,
                        retryable: true,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
