use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    builder::ValueParser,
    Arg, ArgAction, ColorChoice, Command,
};
use tracing::Level;

/// The in-process fakes are selected with the literal URL `memory:`; anything
/// else must be a real base URL, and a REST identity backend needs an API key.
///
/// # Errors
/// Returns an error string when a REST identity URL has no API key or a URL
/// has an unsupported scheme.
pub fn validate(matches: &clap::ArgMatches) -> Result<(), String> {
    let Some(identity_url) = matches.get_one::<String>("identity-url") else {
        return Ok(()); // Should be handled by required=true in clap
    };

    if identity_url.starts_with("http://") || identity_url.starts_with("https://") {
        if !matches.contains_id("identity-api-key") {
            return Err(
                "Missing required argument: --identity-api-key (required for a REST identity provider)"
                    .to_string(),
            );
        }
    } else if identity_url != "memory:" {
        return Err(format!(
            "Invalid --identity-url {identity_url:?}: expected http(s)://... or memory:"
        ));
    }

    if let Some(store_url) = matches.get_one::<String>("store-url") {
        if !store_url.starts_with("http://")
            && !store_url.starts_with("https://")
            && store_url != "memory:"
        {
            return Err(format!(
                "Invalid --store-url {store_url:?}: expected http(s)://... or memory:"
            ));
        }
    }

    Ok(())
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("anteroom")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("ANTEROOM_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("identity-url")
                .long("identity-url")
                .help("Identity provider base URL, or 'memory:' for the in-process fake")
                .env("ANTEROOM_IDENTITY_URL")
                .required(true),
        )
        .arg(
            Arg::new("identity-api-key")
                .long("identity-api-key")
                .help("API key for the identity provider (required for REST)")
                .env("ANTEROOM_IDENTITY_API_KEY"),
        )
        .arg(
            Arg::new("store-url")
                .long("store-url")
                .help("Document store base URL, or 'memory:' for the in-process fake")
                .env("ANTEROOM_STORE_URL")
                .required(true),
        )
        .arg(
            Arg::new("frontend-url")
                .long("frontend-url")
                .help("Frontend origin allowed by CORS (credentials enabled)")
                .default_value("http://localhost:3000")
                .env("ANTEROOM_FRONTEND_URL"),
        )
        .arg(
            Arg::new("cookie-secure")
                .long("cookie-secure")
                .help("Mark session cookies Secure (set behind HTTPS)")
                .env("ANTEROOM_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("openai-api-key")
                .long("openai-api-key")
                .help("Server-side key for the OpenAI proxy endpoint")
                .env("ANTEROOM_OPENAI_API_KEY"),
        )
        .arg(
            Arg::new("anthropic-api-key")
                .long("anthropic-api-key")
                .help("Server-side key for the Anthropic proxy endpoint")
                .env("ANTEROOM_ANTHROPIC_API_KEY"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Log verbosity, repeat to increase (env accepts error..trace)")
                .env("ANTEROOM_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(parse_log_level()),
        );

    command
}

/// The env form takes a level name; the flag form is a repeat count. Both land
/// on the same 0..=5 scale.
fn parse_log_level() -> ValueParser {
    ValueParser::from(|level: &str| -> Result<u8, String> {
        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            other => match other.parse::<u8>() {
                Ok(count) if count <= 5 => Ok(count),
                _ => Err(format!("invalid log level {other:?}")),
            },
        }
    })
}

/// Verbosity mapped to a tracing level; `None` keeps the ERROR-only default.
#[must_use]
pub fn log_level(matches: &clap::ArgMatches) -> Option<Level> {
    match matches.get_one::<u8>("verbosity").copied().unwrap_or(0) {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "anteroom");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_args() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "anteroom",
            "--port",
            "9090",
            "--identity-url",
            "https://identity.example.test",
            "--identity-api-key",
            "key-123",
            "--store-url",
            "https://store.example.test",
            "--frontend-url",
            "https://app.example.test",
            "--cookie-secure",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(9090));
        assert_eq!(
            matches.get_one::<String>("identity-url").cloned(),
            Some("https://identity.example.test".to_string())
        );
        assert_eq!(
            matches.get_one::<String>("store-url").cloned(),
            Some("https://store.example.test".to_string())
        );
        assert!(matches.get_flag("cookie-secure"));
        assert!(validate(&matches).is_ok());
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("ANTEROOM_PORT", Some("443")),
                ("ANTEROOM_IDENTITY_URL", Some("memory:")),
                ("ANTEROOM_STORE_URL", Some("memory:")),
                ("ANTEROOM_FRONTEND_URL", Some("https://app.example.test")),
                ("ANTEROOM_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["anteroom"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>("identity-url").cloned(),
                    Some("memory:".to_string())
                );
                assert_eq!(
                    matches.get_one::<String>("frontend-url").cloned(),
                    Some("https://app.example.test".to_string())
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
                assert!(validate(&matches).is_ok());
            },
        );
    }

    #[test]
    fn test_log_level_env_names() {
        let cases = [
            ("error", None),
            ("warn", Some(tracing::Level::WARN)),
            ("info", Some(tracing::Level::INFO)),
            ("debug", Some(tracing::Level::DEBUG)),
            ("trace", Some(tracing::Level::TRACE)),
        ];
        for (name, expected) in cases {
            temp_env::with_vars(
                [
                    ("ANTEROOM_LOG_LEVEL", Some(name)),
                    ("ANTEROOM_IDENTITY_URL", Some("memory:")),
                    ("ANTEROOM_STORE_URL", Some("memory:")),
                ],
                || {
                    let matches = new().get_matches_from(vec!["anteroom"]);
                    assert_eq!(log_level(&matches), expected, "{name}");
                },
            );
        }
    }

    #[test]
    fn test_log_level_flag_count() {
        temp_env::with_vars([("ANTEROOM_LOG_LEVEL", None::<String>)], || {
            for (flags, expected) in [
                (0, None),
                (1, Some(tracing::Level::WARN)),
                (2, Some(tracing::Level::INFO)),
                (3, Some(tracing::Level::DEBUG)),
                (4, Some(tracing::Level::TRACE)),
                (6, Some(tracing::Level::TRACE)),
            ] {
                let mut args = vec![
                    "anteroom".to_string(),
                    "--identity-url".to_string(),
                    "memory:".to_string(),
                    "--store-url".to_string(),
                    "memory:".to_string(),
                ];
                if flags > 0 {
                    args.push(format!("-{}", "v".repeat(flags)));
                }

                let matches = new().get_matches_from(args);
                assert_eq!(log_level(&matches), expected, "-v x{flags}");
            }
        });
    }

    #[test]
    fn test_rest_identity_requires_api_key() {
        temp_env::with_vars([("ANTEROOM_IDENTITY_API_KEY", None::<String>)], || {
            let command = new();
            let matches = command.get_matches_from(vec![
                "anteroom",
                "--identity-url",
                "https://identity.example.test",
                "--store-url",
                "memory:",
            ]);
            let err = validate(&matches).expect_err("api key required");
            assert!(err.contains("identity-api-key"));
        });
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "anteroom",
            "--identity-url",
            "memory:",
            "--store-url",
            "ftp://store.example.test",
        ]);
        let err = validate(&matches).expect_err("bad scheme");
        assert!(err.contains("store-url"));
    }
}
