//! Minimal HTML shells for the guard's page-route match set.
//!
//! The real UI lives in an external frontend; these pages only exist so the
//! route guard has something to protect and redirect between.

use axum::response::Html;

fn shell(title: &str, heading: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body><main><h1>{heading}</h1></main></body>\n</html>\n"
    ))
}

pub async fn home() -> Html<String> {
    shell("Home", "Home")
}

pub async fn account() -> Html<String> {
    shell("Account", "Your account")
}

pub async fn login() -> Html<String> {
    shell("Sign in", "Sign in")
}

pub async fn register() -> Html<String> {
    shell("Register", "Create an account")
}

pub async fn forgot_password() -> Html<String> {
    shell("Forgot password", "Reset your password")
}

pub async fn reset_password() -> Html<String> {
    shell("Reset password", "Choose a new password")
}

/// OAuth provider redirects land here; the frontend finishes the exchange.
pub async fn oauth() -> Html<String> {
    shell("Signing in", "Completing sign in")
}
