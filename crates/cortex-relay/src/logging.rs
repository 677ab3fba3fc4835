//! Logging setup shared by both binaries.

use std::env;
use std::io::{self, IsTerminal};

use clap::Args;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Verbosity and output flags.
#[derive(Debug, Clone, Default, Args)]
pub struct LogOpts {
    /// Reduce output to only errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Enable debug logging (equivalent to -v)
    #[arg(long, global = true)]
    pub debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    pub trace: bool,
    /// Emit logs as JSON lines
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

impl LogOpts {
    pub fn level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::ERROR
        } else if self.trace {
            LevelFilter::TRACE
        } else if self.debug {
            LevelFilter::DEBUG
        } else {
            match self.verbose {
                0 => LevelFilter::INFO,
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
        }
    }

    fn use_color(&self) -> bool {
        !self.no_color && env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal()
    }

    /// Directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> String {
        let level = self.level().to_string().to_lowercase();
        format!("cortex_relay={level},cortex_relay_protocol={level},tower_http={level}")
    }
}

/// Install the global subscriber. Logs go to stderr; `RUST_LOG` wins over
/// the flags.
pub fn init_logging(opts: &LogOpts) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(opts.default_directive()));

    if opts.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_ansi(opts.use_color()),
            )
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_flags() {
        let mut opts = LogOpts::default();
        assert_eq!(opts.level(), LevelFilter::INFO);

        opts.verbose = 2;
        assert_eq!(opts.level(), LevelFilter::TRACE);

        opts.quiet = true;
        assert_eq!(opts.level(), LevelFilter::ERROR);
    }

    #[test]
    fn default_directive_covers_both_crates() {
        let opts = LogOpts {
            debug: true,
            ..LogOpts::default()
        };
        assert_eq!(
            opts.default_directive(),
            "cortex_relay=debug,cortex_relay_protocol=debug,tower_http=debug"
        );
    }
}
