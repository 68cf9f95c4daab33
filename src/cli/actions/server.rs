use crate::api::{self, AppConfig, AppContext};
use crate::identity::{memory::MemoryIdentityProvider, rest::RestIdentityProvider, IdentityProvider};
use crate::store::{memory::MemoryProfileStore, rest::RestProfileStore, ProfileStore};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Selects the in-process fakes; anything else is treated as a base URL.
const MEMORY_URL: &str = "memory:";

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub identity_url: String,
    pub identity_api_key: Option<SecretString>,
    pub store_url: String,
    pub frontend_url: String,
    pub cookie_secure: bool,
    pub openai_api_key: Option<SecretString>,
    pub anthropic_api_key: Option<SecretString>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a backend URL is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let identity = build_identity(&args)?;
    let store = build_store(&args)?;

    let mut config = AppConfig::new(args.frontend_url).with_cookie_secure(args.cookie_secure);
    if let Some(key) = args.openai_api_key {
        config = config.with_openai_api_key(key);
    }
    if let Some(key) = args.anthropic_api_key {
        config = config.with_anthropic_api_key(key);
    }

    let context = Arc::new(AppContext::new(identity, store, config)?);
    api::serve(args.port, context).await
}

fn build_identity(args: &Args) -> Result<Arc<dyn IdentityProvider>> {
    if args.identity_url == MEMORY_URL {
        warn!("using the in-memory identity provider; accounts are lost on restart");
        return Ok(Arc::new(MemoryIdentityProvider::new()));
    }

    let url = Url::parse(&args.identity_url).context("Invalid identity provider URL")?;
    let api_key = args
        .identity_api_key
        .clone()
        .ok_or_else(|| anyhow!("identity API key is required for a REST identity provider"))?;
    Ok(Arc::new(RestIdentityProvider::new(url, api_key)?))
}

fn build_store(args: &Args) -> Result<Arc<dyn ProfileStore>> {
    if args.store_url == MEMORY_URL {
        warn!("using the in-memory profile store; profiles are lost on restart");
        return Ok(Arc::new(MemoryProfileStore::new()));
    }

    let url = Url::parse(&args.store_url).context("Invalid document store URL")?;
    Ok(Arc::new(RestProfileStore::new(url)?))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("identity_url", args.identity_url.clone()),
        (
            "identity_api_key_set",
            args.identity_api_key.is_some().to_string(),
        ),
        ("store_url", args.store_url.clone()),
        ("frontend_url", args.frontend_url.clone()),
        ("cookie_secure", args.cookie_secure.to_string()),
        (
            "openai_api_key_set",
            args.openai_api_key.is_some().to_string(),
        ),
        (
            "anthropic_api_key_set",
            args.anthropic_api_key.is_some().to_string(),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            port: 8080,
            identity_url: MEMORY_URL.to_string(),
            identity_api_key: None,
            store_url: MEMORY_URL.to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            cookie_secure: false,
            openai_api_key: None,
            anthropic_api_key: None,
        }
    }

    #[test]
    fn memory_urls_select_the_fakes() {
        assert!(build_identity(&args()).is_ok());
        assert!(build_store(&args()).is_ok());
    }

    #[test]
    fn rest_identity_requires_a_key() {
        let mut args = args();
        args.identity_url = "https://identity.example.test".to_string();
        assert!(build_identity(&args).is_err());

        args.identity_api_key = Some(SecretString::from("key-123"));
        assert!(build_identity(&args).is_ok());
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
        assert_eq!(short_commit(" unknown "), "unknown");
    }
}
