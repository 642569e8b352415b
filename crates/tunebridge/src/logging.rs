use std::io;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tunebridge_core::{TuneError, TuneResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TuneError::Configuration(format!(
                "unknown log format {other}, expected compact, pretty or json"
            ))),
        }
    }
}

fn filter_directives(level: &str) -> String {
    let level = level.trim();
    [
        "tunebridge",
        "tunebridge_core",
        "tunebridge_config",
        "tunebridge_cache",
        "tunebridge_music",
        "tunebridge_follow",
    ]
    .iter()
    .fold("warn".to_string(), |mut directives, krate| {
        directives.push_str(&format!(",{krate}={level}"));
        directives
    })
}

fn build_filter(level: &str) -> TuneResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(filter_directives(level))
        .map_err(|err| TuneError::Configuration(format!("invalid log level {level}: {err}")))
}

/// Installs the global subscriber. Logs go to stderr so command output stays clean.
pub fn init_logging(level: &str, format: LogFormat) -> TuneResult<()> {
    let filter = build_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(io::stderr),
            )
            .try_init(),
    };
    result.map_err(|err| TuneError::Configuration(format!("failed to initialize logging: {err}")))
}
