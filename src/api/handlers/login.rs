//! Login, OAuth login, and logout handlers.
//!
//! Both login variants apply the approval policy: unapproved or suspended
//! accounts get their fresh session revoked and the cookie pair cleared in
//! the same response, so the browser never holds a token for a gated account.

use axum::extract::Extension;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use super::session::{clear_cookies, request_token, session_cookies};
use crate::api::error::{ApiError, ErrorBody};
use crate::api::AppContext;
use crate::identity::Session;
use crate::session::{self, AuthError};
use crate::store::UserProfile;
use crate::validation::validate_email;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GoogleLoginRequest {
    /// Google id token obtained by the frontend OAuth flow.
    pub credential: String,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserProfile,
}

#[utoipa::path(
    post,
    path = "/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in, cookies set", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Account not approved or suspended", body = ErrorBody),
    ),
    tag = "auth",
)]
pub async fn login(
    Extension(context): Extension<Arc<AppContext>>,
    Json(payload): Json<LoginRequest>,
) -> Response {
    let email = payload.email.trim().to_lowercase();
    if let Err(message) = validate_email(&email) {
        return ApiError::BadRequest(message).into_response();
    }

    match session::login(
        &context.identity,
        &context.store,
        &context.sessions,
        &email,
        &payload.password,
    )
    .await
    {
        Ok((session, profile)) => success(&context, &session, profile),
        Err(err) => failure(&context, err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/login/google",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Signed in, cookies set", body = LoginResponse),
        (status = 401, description = "Credential rejected by the provider", body = ErrorBody),
        (status = 403, description = "Account not approved or suspended", body = ErrorBody),
    ),
    tag = "auth",
)]
pub async fn login_google(
    Extension(context): Extension<Arc<AppContext>>,
    Json(payload): Json<GoogleLoginRequest>,
) -> Response {
    match session::login_with_google(
        &context.identity,
        &context.store,
        &context.sessions,
        &payload.credential,
    )
    .await
    {
        Ok((session, profile)) => success(&context, &session, profile),
        Err(err) => failure(&context, err),
    }
}

fn success(context: &AppContext, session: &Session, profile: UserProfile) -> Response {
    info!("signed in: {}", session.uid);
    match session_cookies(
        &session.id_token,
        &session.refresh_token,
        context.config.cookie_secure(),
    ) {
        Ok(cookies) => (StatusCode::OK, cookies, Json(LoginResponse { user: profile }))
            .into_response(),
        Err(err) => ApiError::Internal(err.to_string()).into_response(),
    }
}

fn failure(context: &AppContext, err: AuthError) -> Response {
    let gated = matches!(err, AuthError::NotApproved | AuthError::Suspended);
    let mut response = ApiError::Auth(err).into_response();

    // Policy rejections also evict any cookies the browser may still hold.
    if gated {
        let cleared = clear_cookies(context.config.cookie_secure());
        for value in cleared.get_all(SET_COOKIE) {
            response.headers_mut().append(SET_COOKIE, value.clone());
        }
    }

    response
}

#[utoipa::path(
    post,
    path = "/v1/logout",
    responses(
        (status = 204, description = "Signed out, cookies cleared"),
    ),
    tag = "auth",
)]
/// Idempotent: succeeds with or without a live session.
pub async fn logout(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
) -> Response {
    if let Some(token) = request_token(&headers) {
        if let Ok(info) = context.identity.verify_token(&token).await {
            session::logout(&context.identity, &context.sessions, &info.uid).await;
        }
    }

    (
        StatusCode::NO_CONTENT,
        clear_cookies(context.config.cookie_secure()),
    )
        .into_response()
}
