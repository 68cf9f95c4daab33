//! HTTP surface: router assembly, shared context, and the server loop.

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, header},
    middleware,
    routing::{get, post},
};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, debug_span, error, info, warn};
use ulid::Ulid;

use crate::identity::IdentityProvider;
use crate::session::SessionRegistry;
use crate::store::ProfileStore;

pub mod error;
pub mod guard;
pub mod handlers;
pub mod openapi;

/// Re-export so the `openapi` dump binary only needs this module.
pub use openapi::openapi as openapi_spec;

/// Runtime configuration shared by all handlers.
#[derive(Clone, Debug)]
pub struct AppConfig {
    frontend_url: String,
    cookie_secure: bool,
    openai_api_key: Option<SecretString>,
    anthropic_api_key: Option<SecretString>,
}

impl AppConfig {
    #[must_use]
    pub fn new(frontend_url: impl Into<String>) -> Self {
        Self {
            frontend_url: frontend_url.into(),
            cookie_secure: false,
            openai_api_key: None,
            anthropic_api_key: None,
        }
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_openai_api_key(mut self, key: SecretString) -> Self {
        self.openai_api_key = Some(key);
        self
    }

    #[must_use]
    pub fn with_anthropic_api_key(mut self, key: SecretString) -> Self {
        self.anthropic_api_key = Some(key);
        self
    }

    #[must_use]
    pub fn frontend_url(&self) -> &str {
        &self.frontend_url
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn openai_api_key(&self) -> Option<&SecretString> {
        self.openai_api_key.as_ref()
    }

    #[must_use]
    pub fn anthropic_api_key(&self) -> Option<&SecretString> {
        self.anthropic_api_key.as_ref()
    }
}

/// Everything a handler needs, injected once as an `Extension`.
pub struct AppContext {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn ProfileStore>,
    pub sessions: SessionRegistry,
    pub config: AppConfig,
    pub http: reqwest::Client,
}

impl AppContext {
    /// # Errors
    /// Fails only when the outbound HTTP client cannot be built.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        config: AppConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("Failed to build outbound HTTP client")?;

        Ok(Self {
            identity,
            store: store.clone(),
            sessions: SessionRegistry::new(store),
            config,
            http,
        })
    }
}

/// Assemble the full application router; also used directly by the
/// integration tests via `tower::ServiceExt::oneshot`.
#[must_use]
pub fn app(context: Arc<AppContext>) -> Router {
    let (api, _openapi) = openapi::api_router().split_for_parts();

    let pages = Router::new()
        .route("/", get(handlers::pages::home))
        .route("/account", get(handlers::pages::account))
        .route("/login", get(handlers::pages::login))
        .route("/register", get(handlers::pages::register))
        .route("/forgot-password", get(handlers::pages::forgot_password))
        .route("/reset-password", get(handlers::pages::reset_password))
        .route("/oauth/{*path}", get(handlers::pages::oauth))
        .route_layer(middleware::from_fn(guard::page_guard));

    api.merge(pages)
        .route("/v1/llm/openai", post(handlers::llm::openai))
        .route("/v1/llm/anthropic", post(handlers::llm::anthropic))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors_layer(context.config.frontend_url()))
                .layer(Extension(context)),
        )
}

/// Browser credentials require an exact origin; a wildcard cannot be combined
/// with `allow_credentials`.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match frontend_url.trim_end_matches('/').parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(err) => {
            warn!("invalid frontend origin {frontend_url:?}: {err}; CORS allows no origin");
            layer
        }
    }
}

/// Bind and serve until interrupted.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(port: u16, context: Arc<AppContext>) -> Result<()> {
    let app = app(context);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
