use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;

/// Parse arguments, bring up logging, and hand back the action to run.
///
/// # Errors
/// Returns an error when telemetry setup or argument dispatch fails.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(commands::log_level(&matches))?;

    dispatch::handler(&matches)
}
