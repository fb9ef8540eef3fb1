// Logging for the satchel substrate
//
// Thin setup layer over `tracing` and `tracing-subscriber`. Components log with the
// plain tracing macros or the span/event macros below; binaries and tests pick one
// of the `init_*` presets once at startup.
//
// ```rust,ignore
// use satchel::logging;
//
// logging::init_development();
//
// let span = satchel::pool_span!("scan", units = 120);
// let _guard = span.enter();
// satchel::log_pool!("scan", "dispatched", partitions = 4);
// ```

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Emit one JSON object per event
    pub json_format: bool,
    /// Include file and line information
    pub show_file_line: bool,
    /// Include thread name/id (pool workers are named threads)
    pub show_thread_info: bool,
    /// Include timestamps
    pub show_time: bool,
    /// Extra directives, "target=level,target2=level2"
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

static INIT: Once = Once::new();

fn build_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());
    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            if let Ok(directive) = filter.trim().parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }
    env_filter
}

/// Install the global subscriber. Only the first call in a process takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(build_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
            Box::new(registry.with(fmt::layer().json().flatten_event(true)))
        } else if config.show_time {
            Box::new(
                registry.with(
                    fmt::layer()
                        .with_ansi(atty::is(atty::Stream::Stdout))
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info)
                        .with_thread_ids(config.show_thread_info),
                ),
            )
        } else {
            Box::new(
                registry.with(
                    fmt::layer()
                        .without_time()
                        .with_ansi(atty::is(atty::Stream::Stdout))
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info)
                        .with_thread_ids(config.show_thread_info),
                ),
            )
        };

        set_global_subscriber(subscriber);
    });
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Open `path` for appending, creating it when missing.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// Log to the console and to `log_file`. The file copy never carries ANSI colors.
///
/// Fails when the file cannot be opened; nothing is installed in that case.
pub fn init_with_file(config: LogConfig, log_file: &str) -> io::Result<()> {
    // Probe once so a bad path is reported to the caller instead of swallowed.
    drop(file_writer(log_file)?);

    INIT.call_once(|| {
        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true);

        let subscriber = tracing_subscriber::registry()
            .with(build_filter(&config))
            .with(console_layer)
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG everywhere, TRACE for the lock and pools where contention shows up.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        target_filters: Some("satchel::lock=trace,satchel::pool=trace".to_string()),
        ..Default::default()
    });
}

/// JSON output for log aggregation, no source locations.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Warnings and errors only, compact.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Span covering one pool dispatch.
#[macro_export]
macro_rules! pool_span {
    ($pool:expr) => {
        tracing::debug_span!("pool", name = $pool)
    };
    ($pool:expr, $($fields:tt)*) => {
        tracing::debug_span!("pool", name = $pool, $($fields)*)
    };
}

/// Span covering one page request.
#[macro_export]
macro_rules! bridge_span {
    ($req_id:expr, $origin:expr) => {
        tracing::debug_span!("bridge", req_id = $req_id, origin = $origin)
    };
}

/// Pool lifecycle and dispatch events.
#[macro_export]
macro_rules! log_pool {
    ($pool:expr, $event:expr) => {
        tracing::debug!(pool = $pool, event = $event);
    };
    ($pool:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(pool = $pool, event = $event, $($fields)*);
    };
}

/// Client lock transitions.
#[macro_export]
macro_rules! log_lock {
    ($event:expr) => {
        tracing::trace!(target: "satchel::lock", event = $event);
    };
    ($event:expr, $($fields:tt)*) => {
        tracing::trace!(target: "satchel::lock", event = $event, $($fields)*);
    };
}

/// Watchdog decisions.
#[macro_export]
macro_rules! log_watchdog {
    ($surface:expr, $event:expr) => {
        tracing::info!(surface = %$surface, event = $event);
    };
    ($surface:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(surface = %$surface, event = $event, $($fields)*);
    };
}

/// The dispatcher active on the calling thread.
///
/// Pool and single-shot worker threads install it so their events reach the
/// same subscriber as the thread that created them.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}
