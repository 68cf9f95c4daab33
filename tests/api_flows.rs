#![allow(clippy::unwrap_used, clippy::expect_used)]

use anteroom::api::{app, AppConfig, AppContext};
use anteroom::identity::memory::MemoryIdentityProvider;
use anteroom::identity::IdentityProvider;
use anteroom::roles::Role;
use anteroom::store::memory::MemoryProfileStore;
use anteroom::store::{AccountStatus, ProfilePatch, ProfileStore, UserProfile};
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct Backend {
    app: Router,
    identity: Arc<MemoryIdentityProvider>,
    store: Arc<MemoryProfileStore>,
}

fn backend() -> Backend {
    let identity = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(MemoryProfileStore::new());
    let context = AppContext::new(
        identity.clone(),
        store.clone(),
        AppConfig::new("http://localhost:3000"),
    )
    .expect("context");
    Backend {
        app: app(Arc::new(context)),
        identity,
        store,
    }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_with(uri: &str, name: header::HeaderName, value: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(name, value)
        .body(Body::empty())
        .expect("request")
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

fn auth_cookie(response: &Response<Body>) -> Option<String> {
    set_cookies(response)
        .iter()
        .find(|c| c.starts_with("firebaseAuthToken=") && !c.contains("Max-Age=0"))
        .and_then(|c| c.split(';').next().map(str::to_string))
}

/// Seed an approved profile with the given role and return a bearer token.
async fn seed_user(backend: &Backend, email: &str, role: Role) -> (String, String) {
    let session = backend
        .identity
        .sign_up(email, "secret1", Some("Seeded"))
        .await
        .expect("sign up");
    let mut profile = UserProfile::bootstrap(&session);
    profile.role = role;
    backend.store.put(&profile).await.expect("seed profile");
    (session.uid, format!("Bearer {}", session.id_token))
}

#[tokio::test]
async fn self_registration_waits_for_approval() {
    let backend = backend();

    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/register",
            &json!({"name": "Alice", "email": "alice@example.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["accountApproved"], false);

    // Login against the unapproved account is terminated with a stable code
    // and the cookie pair is cleared.
    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/login",
            &json!({"email": "alice@example.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("firebaseAuthToken=;")));
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    let body = body_json(response).await;
    assert_eq!(body["code"], "ACCOUNT_NOT_APPROVED");
}

#[tokio::test]
async fn suspended_login_gets_its_own_code() {
    let backend = backend();
    let (uid, _) = seed_user(&backend, "bob@example.com", Role::Admin).await;
    backend
        .store
        .update(
            &uid,
            ProfilePatch {
                account_status: Some(AccountStatus::Suspended),
                ..ProfilePatch::default()
            },
        )
        .await
        .expect("suspend");

    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/login",
            &json!({"email": "bob@example.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["code"], "ACCOUNT_SUSPENDED");
}

#[tokio::test]
async fn login_cookie_round_trips_through_the_session_endpoint() {
    let backend = backend();
    backend
        .identity
        .sign_up("carol@example.com", "secret1", Some("Carol"))
        .await
        .expect("sign up");

    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/login",
            &json!({"email": "carol@example.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = auth_cookie(&response).expect("auth cookie");
    let body = body_json(response).await;
    let uid = body["user"]["id"].as_str().expect("uid").to_string();

    let response = backend
        .app
        .clone()
        .oneshot(get_with("/v1/session", header::COOKIE, &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["userId"], uid.as_str());

    // The derived view is live for the same cookie.
    let response = backend
        .app
        .clone()
        .oneshot(get_with("/v1/authz", header::COOKIE, &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["isAdmin"], true);
    assert_eq!(body["isMaster"], false);
}

#[tokio::test]
async fn logout_is_idempotent_and_always_clears_cookies() {
    let backend = backend();

    for _ in 0..2 {
        let response = backend
            .app
            .clone()
            .oneshot(post_json("/v1/logout", &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }
}

#[tokio::test]
async fn first_google_login_bootstraps_an_admin_profile() {
    let backend = backend();

    // The in-memory provider treats the credential as a bare email and
    // auto-provisions the account, mirroring a first federated sign-in.
    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/login/google",
            &json!({"credential": "dana@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["accountApproved"], true);
    assert_eq!(body["user"]["accountStatus"], "active");

    let uid = body["user"]["id"].as_str().expect("uid");
    let stored = backend
        .store
        .get(uid)
        .await
        .expect("get")
        .expect("bootstrapped profile");
    assert_eq!(stored.role, Role::Admin);
}

#[tokio::test]
async fn a_reset_code_only_works_once() {
    let backend = backend();
    backend
        .identity
        .sign_up("erin@example.com", "secret1", None)
        .await
        .expect("sign up");

    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/password/forgot",
            &json!({"email": "erin@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let code = backend.identity.last_reset_code().expect("reset code");
    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/password/reset",
            &json!({"oobCode": code, "newPassword": "changed1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Replaying the same code fails cleanly.
    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/password/reset",
            &json!({"oobCode": code, "newPassword": "changed2"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(
        body["message"]
            .as_str()
            .expect("message")
            .contains("invalid or expired"),
        "unexpected message: {body}"
    );
}

#[tokio::test]
async fn permission_matrix_gates_management_routes() {
    let backend = backend();
    let (_, master) = seed_user(&backend, "master@example.com", Role::Master).await;
    let (_, admin) = seed_user(&backend, "admin@example.com", Role::Admin).await;
    let (_, viewer) = seed_user(&backend, "viewer@example.com", Role::Viewer).await;

    // Both admin and master manage users.
    for bearer in [&master, &admin] {
        let response = backend
            .app
            .clone()
            .oneshot(get_with("/v1/users", header::AUTHORIZATION, bearer))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Only master sees the approval queue; master does not imply admin.
    let response = backend
        .app
        .clone()
        .oneshot(get_with("/v1/users/pending", header::AUTHORIZATION, &master))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = backend
        .app
        .clone()
        .oneshot(get_with("/v1/users/pending", header::AUTHORIZATION, &admin))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = backend
        .app
        .clone()
        .oneshot(get_with("/v1/users", header::AUTHORIZATION, &viewer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn approval_unblocks_login() {
    let backend = backend();
    let (_, master) = seed_user(&backend, "master@example.com", Role::Master).await;

    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/register",
            &json!({"name": "Frank", "email": "frank@example.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let uid = body["user"]["id"].as_str().expect("uid").to_string();

    let response = backend
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/v1/users/{uid}/approval"))
                .header(header::AUTHORIZATION, &master)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"action": "approve"}).to_string()))
                .expect("request"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["accountApproved"], true);
    assert!(body["approvedAt"].is_string());

    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/login",
            &json!({"email": "frank@example.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn invitation_rejects_an_orphaned_provider_account() {
    let backend = backend();
    let (_, master) = seed_user(&backend, "master@example.com", Role::Master).await;

    // Provider account with no profile document, e.g. a half-finished
    // registration. The email is still taken.
    backend
        .identity
        .sign_up("ghost@example.com", "secret1", None)
        .await
        .expect("sign up");

    let response = backend
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/users")
                .header(header::AUTHORIZATION, &master)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"email": "ghost@example.com", "role": "viewer"}).to_string(),
                ))
                .expect("request"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn staff_invitation_completes_registration() {
    let backend = backend();
    let (_, master) = seed_user(&backend, "master@example.com", Role::Master).await;

    let response = backend
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/users")
                .header(header::AUTHORIZATION, &master)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"email": "gabi@example.com", "role": "editor"}).to_string(),
                ))
                .expect("request"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["accountStatus"], "pending");
    assert_eq!(body["accountApproved"], true);

    let response = backend
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/register/complete?email=gabi@example.com")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["invited"], true);
    assert_eq!(body["completed"], false);

    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/register/complete",
            &json!({"email": "gabi@example.com", "name": "Gabi", "password": "chosen1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["accountStatus"], "active");
    assert_eq!(body["user"]["name"], "Gabi");

    // The invited editor can now sign in with their chosen password.
    let response = backend
        .app
        .clone()
        .oneshot(post_json(
            "/v1/login",
            &json!({"email": "gabi@example.com", "password": "chosen1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
