use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use super::error::ApiError;
use crate::extractors::AppJson;
use crate::ingest::{ImportProfile, IngestError};
use crate::models::UploadResult;
use crate::services::ingestion_service::ImportRequest;
use crate::services::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ReimportRequest {
    #[validate(length(min = 1, max = 128))]
    pub shop_id: String,
    #[validate(length(min = 1, max = 1024))]
    pub file_ref: String,
}

fn resolve_profile(name: &str) -> Result<&'static ImportProfile, ApiError> {
    ImportProfile::by_name(name).ok_or_else(|| IngestError::UnknownProfile(name.to_string()).into())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Uploaded file is too large".to_string())
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err))
    }
}

async fn acquire_import_slot(state: &AppState, shop_id: &str) -> Result<(), ApiError> {
    let allowed = state.import_limiter.try_acquire(shop_id).await.map_err(|e| {
        tracing::error!("Import rate limit check failed: {}", e);
        ApiError::Internal("Rate limit check failed".to_string())
    })?;

    if !allowed {
        return Err(ApiError::TooManyRequests(format!(
            "Too many imports for shop {}, try again later",
            shop_id
        )));
    }
    Ok(())
}

/// POST /api/v1/imports/{profile} - multipart with `file` and `shop_id`
pub async fn upload_report(
    State(state): State<Arc<AppState>>,
    Path(profile_name): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResult>, ApiError> {
    let profile = resolve_profile(&profile_name)?;
    let max_bytes = state.config.ingestion.max_upload_bytes;

    let mut shop_id: Option<String> = None;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("shop_id") => {
                let value = field.text().await.map_err(multipart_error)?;
                shop_id = Some(value.trim().to_string());
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.xlsx").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload = Some((file_name, bytes.to_vec()));
            }
            Some(other) => tracing::debug!(field = other, "Ignoring unknown multipart field"),
            None => {}
        }
    }

    let shop_id = shop_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("shop_id is required"))?;
    let (file_name, bytes) = upload.ok_or_else(|| ApiError::bad_request("file is required"))?;

    if bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Uploaded file exceeds {} bytes",
            max_bytes
        )));
    }

    acquire_import_slot(&state, &shop_id).await?;

    tracing::info!(
        profile = profile.name,
        shop_id = %shop_id,
        file_name = %file_name,
        size = bytes.len(),
        "Import requested"
    );

    let result = state
        .ingestion
        .import(
            profile,
            ImportRequest {
                shop_id,
                file_name,
                bytes,
            },
        )
        .await?;

    Ok(Json(result))
}

/// POST /api/v1/imports/{profile}/reimport - runs an archived upload again
pub async fn reimport_report(
    State(state): State<Arc<AppState>>,
    Path(profile_name): Path<String>,
    AppJson(req): AppJson<ReimportRequest>,
) -> Result<Json<UploadResult>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;
    let profile = resolve_profile(&profile_name)?;

    acquire_import_slot(&state, &req.shop_id).await?;

    let result = state
        .ingestion
        .reimport(profile, &req.shop_id, &req.file_ref)
        .await?;

    Ok(Json(result))
}
