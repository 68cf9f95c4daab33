use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let identity_url = matches
        .get_one::<String>("identity-url")
        .cloned()
        .context("missing required argument: --identity-url")?;
    let store_url = matches
        .get_one::<String>("store-url")
        .cloned()
        .context("missing required argument: --store-url")?;

    // Validate backend arguments relative to the URL schemes
    crate::cli::commands::validate(matches).map_err(|e| anyhow::anyhow!(e))?;

    let frontend_url = matches
        .get_one::<String>("frontend-url")
        .cloned()
        .unwrap_or_else(|| "http://localhost:3000".to_string());
    let cookie_secure = matches.get_flag("cookie-secure");

    let secret = |id: &str| {
        matches
            .get_one::<String>(id)
            .cloned()
            .map(SecretString::from)
    };

    Ok(Action::Server(Args {
        port,
        identity_url,
        identity_api_key: secret("identity-api-key"),
        store_url,
        frontend_url,
        cookie_secure,
        openai_api_key: secret("openai-api-key"),
        anthropic_api_key: secret("anthropic-api-key"),
    }))
}
