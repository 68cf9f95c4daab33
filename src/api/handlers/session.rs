//! Session cookie bridge.
//!
//! Moves a freshly minted identity token from the client into an `HttpOnly`
//! cookie pair the route guard can read without a provider round trip.
//! Setting the pair verifies the token server-side first; removing it never
//! fails, even when the cookies are already gone.

use axum::extract::Extension;
use axum::http::header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ErrorBody};
use crate::api::AppContext;
use crate::roles::Role;
use crate::store::AccountStatus;

pub const AUTH_COOKIE: &str = "firebaseAuthToken";
pub const REFRESH_COOKIE: &str = "firebaseAuthRefreshToken";

/// 12 hours, matching the upstream contract.
pub const COOKIE_MAX_AGE_SECONDS: i64 = 12 * 60 * 60;

/// Extract a cookie value from request headers.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

/// Auth token from the cookie, falling back to a bearer header for API
/// clients without a cookie jar.
#[must_use]
pub fn request_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = cookie_value(headers, AUTH_COOKIE) {
        return Some(token);
    }
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn build_cookie(
    name: &str,
    value: &str,
    max_age: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// `Set-Cookie` headers for a fresh token pair.
pub(crate) fn session_cookies(
    token: &str,
    refresh_token: &str,
    secure: bool,
) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        build_cookie(AUTH_COOKIE, token, COOKIE_MAX_AGE_SECONDS, secure)?,
    );
    headers.append(
        SET_COOKIE,
        build_cookie(REFRESH_COOKIE, refresh_token, COOKIE_MAX_AGE_SECONDS, secure)?,
    );
    Ok(headers)
}

/// `Set-Cookie` headers that delete the pair.
pub(crate) fn clear_cookies(secure: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in [AUTH_COOKIE, REFRESH_COOKIE] {
        if let Ok(cookie) = build_cookie(name, "", 0, secure) {
            headers.append(SET_COOKIE, cookie);
        }
    }
    headers
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetSessionRequest {
    pub token: String,
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/session",
    request_body = SetSessionRequest,
    responses(
        (status = 204, description = "Cookies set"),
        (status = 401, description = "Token failed verification", body = ErrorBody),
    ),
    tag = "session",
)]
pub async fn set_session(
    Extension(context): Extension<Arc<AppContext>>,
    Json(payload): Json<SetSessionRequest>,
) -> Result<Response, ApiError> {
    // Never store a cookie the provider will not vouch for.
    context.identity.verify_token(&payload.token).await?;

    let headers = session_cookies(
        &payload.token,
        &payload.refresh_token,
        context.config.cookie_secure(),
    )
    .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok((StatusCode::NO_CONTENT, headers).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/session",
    responses(
        (status = 200, description = "Session verified", body = SessionStatusResponse),
        (status = 401, description = "No valid session", body = SessionStatusResponse),
    ),
    tag = "session",
)]
pub async fn session(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = request_token(&headers) else {
        return status_response(StatusCode::UNAUTHORIZED, None, "No token");
    };

    match context.identity.verify_token(&token).await {
        Ok(info) => (
            StatusCode::OK,
            Json(SessionStatusResponse {
                authenticated: true,
                user_id: Some(info.uid),
                email: info.email,
                reason: None,
            }),
        )
            .into_response(),
        Err(_) => status_response(StatusCode::UNAUTHORIZED, None, "Verification failed"),
    }
}

fn status_response(status: StatusCode, user_id: Option<String>, reason: &str) -> Response {
    (
        status,
        Json(SessionStatusResponse {
            authenticated: false,
            user_id,
            email: None,
            reason: Some(reason.to_string()),
        }),
    )
        .into_response()
}

#[utoipa::path(
    delete,
    path = "/v1/session",
    responses(
        (status = 204, description = "Cookies cleared"),
    ),
    tag = "session",
)]
pub async fn remove_session(Extension(context): Extension<Arc<AppContext>>) -> Response {
    // Idempotent: deleting absent cookies is still a success.
    (
        StatusCode::NO_CONTENT,
        clear_cookies(context.config.cookie_secure()),
    )
        .into_response()
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthzResponse {
    pub authenticated: bool,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub is_admin: bool,
    pub is_master: bool,
    pub account_approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_status: Option<AccountStatus>,
    pub profile_loading: bool,
}

#[utoipa::path(
    get,
    path = "/v1/authz",
    responses(
        (status = 200, description = "Derived authorization view", body = AuthzResponse),
        (status = 401, description = "No valid session", body = ErrorBody),
    ),
    tag = "session",
)]
pub async fn authz(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<AuthzResponse>, ApiError> {
    let token = request_token(&headers).ok_or(ApiError::Unauthorized)?;
    let info = context
        .identity
        .verify_token(&token)
        .await
        .map_err(|_| ApiError::Unauthorized)?;

    // Prefer the live reducer view; fall back to a one-shot read when no
    // machine is attached (e.g. after a server restart).
    let (profile, profile_loading) = match context.sessions.view(&info.uid) {
        Some(view) => (view.profile, view.profile_loading),
        None => (context.store.get(&info.uid).await?, false),
    };

    let role = profile.as_ref().map(|profile| profile.role);
    Ok(Json(AuthzResponse {
        authenticated: true,
        user_id: info.uid,
        email: info.email,
        role,
        is_admin: role == Some(Role::Admin),
        is_master: role == Some(Role::Master),
        account_approved: profile
            .as_ref()
            .is_some_and(|profile| profile.account_approved),
        account_status: profile.as_ref().map(|profile| profile.account_status),
        profile_loading,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).expect("cookie"));
        headers
    }

    #[test]
    fn cookie_parsing_handles_multiple_pairs() {
        let headers =
            headers_with_cookie("a=1; firebaseAuthToken=tok-123; firebaseAuthRefreshToken=ref");
        assert_eq!(
            cookie_value(&headers, AUTH_COOKIE).as_deref(),
            Some("tok-123")
        );
        assert_eq!(
            cookie_value(&headers, REFRESH_COOKIE).as_deref(),
            Some("ref")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn bearer_header_is_a_fallback_only() {
        let mut headers = headers_with_cookie("firebaseAuthToken=from-cookie");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(request_token(&headers).as_deref(), Some("from-cookie"));

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(request_token(&headers).as_deref(), Some("from-header"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(request_token(&headers), None);
    }

    #[test]
    fn session_cookies_round_trip_through_a_cookie_header() {
        let headers = session_cookies("tok-123", "ref-456", false).expect("cookies");
        let cookie_header = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| {
                value
                    .to_str()
                    .expect("ascii")
                    .split(';')
                    .next()
                    .expect("pair")
            })
            .collect::<Vec<_>>()
            .join("; ");

        let request = headers_with_cookie(&cookie_header);
        assert_eq!(
            cookie_value(&request, AUTH_COOKIE).as_deref(),
            Some("tok-123")
        );
        assert_eq!(
            cookie_value(&request, REFRESH_COOKIE).as_deref(),
            Some("ref-456")
        );
    }

    #[test]
    fn cookie_attributes_match_the_contract() {
        let headers = session_cookies("t", "r", true).expect("cookies");
        for value in headers.get_all(SET_COOKIE) {
            let cookie = value.to_str().expect("ascii");
            assert!(cookie.contains("HttpOnly"));
            assert!(cookie.contains("SameSite=Lax"));
            assert!(cookie.contains("Path=/"));
            assert!(cookie.contains("Max-Age=43200"));
            assert!(cookie.contains("Secure"));
        }

        let insecure = session_cookies("t", "r", false).expect("cookies");
        for value in insecure.get_all(SET_COOKIE) {
            assert!(!value.to_str().expect("ascii").contains("Secure"));
        }
    }

    #[test]
    fn clear_cookies_expire_both_names() {
        let headers = clear_cookies(false);
        let cookies: Vec<_> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().expect("ascii"))
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().any(|c| c.starts_with("firebaseAuthToken=;")));
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("firebaseAuthRefreshToken=;")));
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }
}
