//! Logging.

use stagehand_error::GenericError;
use tracing::{level_filters::LevelFilter, Subscriber};
use tracing_subscriber::{
    layer::SubscriberExt as _, registry::LookupSpan, util::SubscriberInitExt as _, EnvFilter, Layer,
};

const LOG_LEVEL_ENV_VAR: &str = "STAGEHAND_LOG_LEVEL";
const LOG_FORMAT_JSON_ENV_VAR: &str = "STAGEHAND_LOG_FORMAT_JSON";

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// This function reads the `STAGEHAND_LOG_LEVEL` environment variable to determine the log level to use. If the
/// environment variable is not set, `default_level` is used, falling back to `INFO`. Additionally, it reads the
/// `STAGEHAND_LOG_FORMAT_JSON` environment variable to determine which output format to use. If it is set to `true` or
/// `1`, the logs will be formatted as JSON. If it is set to any other value, or not set at all, the logs will default
/// to a compact, human-readable format.
///
/// # Errors
///
/// If the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(default_level: Option<LevelFilter>) -> Result<(), GenericError> {
    let is_json = std::env::var(LOG_FORMAT_JSON_ENV_VAR)
        .map(|s| is_truthy(&s))
        .unwrap_or(false);

    // Load our level filtering directives from the environment, or fallback to INFO if the environment variable is not
    // specified.
    let level_filter = EnvFilter::builder()
        .with_default_directive(default_level.unwrap_or(LevelFilter::INFO).into())
        .with_env_var(LOG_LEVEL_ENV_VAR)
        .from_env_lossy();

    if is_json {
        tracing_subscriber::registry()
            .with(initialize_tracing_json().with_filter(level_filter))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(initialize_tracing_pretty().with_filter(level_filter))
            .try_init()?;
    }

    Ok(())
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "true" || value == "1"
}

fn initialize_tracing_json<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .json()
        .flatten_event(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
}

fn initialize_tracing_pretty<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new().compact().with_ansi(true).with_target(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_toggle_values() {
        assert!(is_truthy("true"));
        assert!(is_truthy(" TRUE "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("json"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn second_initialization_fails() {
        assert!(initialize_logging(Some(LevelFilter::DEBUG)).is_ok());
        assert!(initialize_logging(None).is_err());
    }
}
