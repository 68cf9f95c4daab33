//! Thin authenticated JSON proxies to the LLM providers.
//!
//! Provider keys never leave the server; the frontend posts the provider's
//! own request body and gets the provider's response back verbatim. These
//! routes are deliberately left out of the OpenAPI document.

use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;

use super::require_permission;
use crate::api::error::ApiError;
use crate::api::AppContext;
use crate::roles::Permission;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub async fn openai(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    require_permission(&context, &headers, Permission::ViewContent).await?;

    let key = context
        .config
        .openai_api_key()
        .ok_or(ApiError::Forbidden("OpenAI proxy is not configured"))?;

    let request = context
        .http
        .post(OPENAI_URL)
        .bearer_auth(key.expose_secret())
        .json(&payload);
    forward(request).await
}

pub async fn anthropic(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    require_permission(&context, &headers, Permission::ViewContent).await?;

    let key = context
        .config
        .anthropic_api_key()
        .ok_or(ApiError::Forbidden("Anthropic proxy is not configured"))?;

    let request = context
        .http
        .post(ANTHROPIC_URL)
        .header("x-api-key", key.expose_secret())
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&payload);
    forward(request).await
}

/// Pass the provider's status and JSON body through unchanged.
async fn forward(request: reqwest::RequestBuilder) -> Result<Response, ApiError> {
    let response = request
        .send()
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body: Value = response
        .json()
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;

    Ok((status, Json(body)).into_response())
}
