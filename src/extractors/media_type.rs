//! Extract a JSON:API request body, enforcing the media type.

use crate::document::MEDIA_TYPE;
use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use serde_json::Value;

/// Parsed body of a mutating request. Rejects with 415 unless `Content-Type` is
/// `application/vnd.api+json` (plain `application/json` is accepted for tooling).
#[derive(Clone, Debug)]
pub struct JsonApiBody(pub Value);

fn accepted_media_type(headers: &HeaderMap) -> Result<(), AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_lowercase();
    if essence == MEDIA_TYPE || essence == "application/json" {
        Ok(())
    } else {
        Err(AppError::UnsupportedMediaType(format!(
            "expected '{}', got '{}'",
            MEDIA_TYPE, content_type
        )))
    }
}

#[async_trait]
impl<S> FromRequest<S> for JsonApiBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        accepted_media_type(req.headers()).map_err(IntoResponse::into_response)?;
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::BadRequest(format!("invalid JSON: {}", e)).into_response())?;
        Ok(JsonApiBody(value))
    }
}
