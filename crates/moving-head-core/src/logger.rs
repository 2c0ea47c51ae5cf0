//! Stderr logging for the engine and the `moving-head` tool.
//!
//! Lines look like `[  0.012s  WARN engine] zone top homography is singular`:
//! seconds since install, level, the last segment of the module path.
//!
//! [`init`] picks the level from a `-v` count unless `MOVING_HEAD_LOG`
//! names one (`error`, `warn`, `info`, `debug`, `trace`, `off`). With the
//! `tracing` feature, [`init_tracing`] installs a `tracing-subscriber`
//! instead.

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable that overrides the verbosity-derived level.
pub const LOG_ENV: &str = "MOVING_HEAD_LOG";

struct RigLogger {
    level: LevelFilter,
    started: Instant,
}

/// `moving_head::engine` → `engine`.
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

impl Log for RigLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<RigLogger> = OnceLock::new();

/// `-v` count to level: none is `warn`, then `info`, `debug`, `trace`.
pub fn verbosity_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Level named by `value`, or `fallback` when it is absent or unparsable.
pub fn level_override(value: Option<&str>, fallback: LevelFilter) -> LevelFilter {
    value
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(fallback)
}

/// Install the logger at `level`. Later calls are no-ops.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| RigLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install the logger from a `-v` count, honoring [`LOG_ENV`].
pub fn init(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let env = std::env::var(LOG_ENV).ok();
    init_with_level(level_override(env.as_deref(), verbosity_level(verbosity)))
}

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
