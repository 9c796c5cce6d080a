//! Logging initialization using `tracing` and `tracing-subscriber`.
//!
//! - [`EnvFilter`]: log level filtering, from `RUST_LOG`
//! - [`LogFormat`]: output format, from `--log-format` or `SATSTAC_LOG_FORMAT`

use std::str::FromStr;

use clap::ValueEnum;
use enum_display::EnumDisplay;
use tracing::Dispatch;
use tracing::dispatcher::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "satstac=info";

/// Log output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, EnumDisplay)]
#[enum_display(case = "Kebab")]
pub enum LogFormat {
    /// Human-readable, single-line logs
    Full,
    /// A variant of the full format, optimized for short line lengths
    #[default]
    Compact,
    /// No timestamps, targets or ANSI colors
    Bare,
    /// Multi-line logs for local debugging
    Pretty,
    /// Newline-delimited JSON
    Json,
}

impl LogFormat {
    fn dispatch(self, env_filter: EnvFilter) -> Dispatch {
        let fmt = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::NONE)
            .with_env_filter(env_filter);
        match self {
            Self::Full => fmt.finish().into(),
            Self::Compact => fmt.compact().finish().into(),
            Self::Pretty => fmt.pretty().finish().into(),
            Self::Bare => fmt
                .compact()
                .without_time()
                .with_target(false)
                .with_ansi(false)
                .finish()
                .into(),
            Self::Json => fmt.json().finish().into(),
        }
    }

    /// Install the global subscriber for this format.
    pub fn init(self, env_filter: EnvFilter) -> Result<(), SetGlobalDefaultError> {
        tracing::dispatcher::set_global_default(self.dispatch(env_filter))
    }
}

/// Build a filter from `filter`, e.g. the value of `RUST_LOG`.
///
/// An unparsable filter falls back to `debug`: whoever set it wants to debug.
#[must_use]
pub fn env_filter(filter: Option<&str>) -> EnvFilter {
    let filter = filter.unwrap_or(DEFAULT_FILTER);
    EnvFilter::from_str(filter).unwrap_or_else(|_| {
        eprintln!("Warning: Invalid log filter '{filter}', using 'debug'");
        EnvFilter::new("debug")
    })
}

pub fn init_tracing(filter: Option<&str>, format: LogFormat) -> Result<(), SetGlobalDefaultError> {
    format.init(env_filter(filter))
}
