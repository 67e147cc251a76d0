//! Tracing initialization.
//!
//! This binary doesn't export to an OTLP collector — just an operator
//! tailing a log file or journal. `RUST_LOG` (defaulting to `info`) drives
//! an `EnvFilter`; `--log-file` (CLI) redirects the same formatted output to
//! a rolling-free append-only file via `tracing-appender`'s non-blocking
//! writer instead of stderr.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initializes the global `tracing` subscriber.
///
/// Builder-style even though there is only one real knob — the registered
/// name is informational and only shows up in the startup log line.
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
    log_file: Option<std::path::PathBuf>,
    verbose_default: bool,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self { name: "", version: "", log_file: None, verbose_default: false }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub fn with_log_file(mut self, path: Option<std::path::PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    /// When `RUST_LOG` is unset, falls back to `debug` instead of `info` —
    /// the effect of a `DEBUG=1` environment flag, through the `EnvFilter`
    /// default directive rather than a bespoke log-level enum.
    pub fn with_verbose_default(mut self, verbose: bool) -> Self {
        self.verbose_default = verbose;
        self
    }

    /// Installs the subscriber globally and returns the appender's
    /// [`WorkerGuard`] when logging to a file — the caller must hold it for
    /// the process lifetime or buffered lines are dropped on exit.
    ///
    /// Panics if a subscriber is already registered — startup-only, and an
    /// invariant that really cannot fail in normal operation.
    pub fn register(self) -> Option<WorkerGuard> {
        let default_directive = if self.verbose_default { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
        let guard = match &self.log_file {
            Some(path) => {
                let (writer, guard) = tracing_appender::non_blocking(open_append(path));
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                    .try_init()
                    .expect("tracing subscriber installed exactly once at startup");
                Some(guard)
            }
            None => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer())
                    .try_init()
                    .expect("tracing subscriber installed exactly once at startup");
                None
            }
        };
        tracing::info!(name = self.name, version = self.version, "starting");
        guard
    }
}

fn open_append(path: &Path) -> std::fs::File {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap_or_else(|e| {
            eprintln!("failed to open log file {}: {e}", path.display());
            std::process::exit(0);
        })
}
