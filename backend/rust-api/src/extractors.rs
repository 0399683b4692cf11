use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Header carrying the learner id, set by the authenticating gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Custom JSON extractor that returns JSON error responses instead of plain text
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                let message = format!("Failed to parse JSON request body: {}", rejection);
                tracing::warn!("{}", message);
                let error_response = json!({
                    "message": message,
                    "status": 400
                });
                Err((StatusCode::BAD_REQUEST, Json(error_response)).into_response())
            }
        }
    }
}

/// Learner identity taken from [`USER_ID_HEADER`]. Missing or blank ids are a 401.
#[derive(Debug, Clone)]
pub struct LearnerId(pub String);

impl<S> FromRequestParts<S> for LearnerId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let learner = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match learner {
            Some(id) => Ok(LearnerId(id.to_string())),
            None => {
                let error_response = json!({
                    "message": format!("Missing {} header", USER_ID_HEADER),
                    "status": 401
                });
                Err((StatusCode::UNAUTHORIZED, Json(error_response)).into_response())
            }
        }
    }
}
