use axum::{http::StatusCode, response::IntoResponse, Json};

use crate::ingest::IngestError;
use crate::services::ingestion_service::ImportFailure;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    PayloadTooLarge(String),
    UnprocessableEntity(String),
    TooManyRequests(String),
    Internal(String),
    Unavailable(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Request failed: {:?}", err);
        ApiError::Internal(err.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::UnknownProfile(_) => ApiError::NotFound(err.to_string()),
            IngestError::Workbook(_) => ApiError::BadRequest(err.to_string()),
            IngestError::SheetNotFound { .. }
            | IngestError::EmptySheet(_)
            | IngestError::MissingColumns(_) => ApiError::UnprocessableEntity(err.to_string()),
        }
    }
}

impl From<ImportFailure> for ApiError {
    fn from(err: ImportFailure) -> Self {
        match err {
            ImportFailure::Rejected(err) => err.into(),
            ImportFailure::Archive(err) => ApiError::Unavailable(err.to_string()),
            ImportFailure::Storage(err) => err.into(),
            ImportFailure::ForeignFile(file_ref) => ApiError::Forbidden(format!(
                "file {} is not an upload of this shop and import type",
                file_ref
            )),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Forbidden(message)
            | ApiError::PayloadTooLarge(message)
            | ApiError::UnprocessableEntity(message)
            | ApiError::TooManyRequests(message)
            | ApiError::Internal(message)
            | ApiError::Unavailable(message) => message,
        };
        let json_response = serde_json::json!({
            "message": message,
            "status": status.as_u16()
        });
        (status, Json(json_response)).into_response()
    }
}
