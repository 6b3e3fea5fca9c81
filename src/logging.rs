use crate::error::{PipelineError, Result};
use chrono::Local;
use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;
use yansi::Paint;

/// Initializes logging for the CLI with the specified default level
///
/// `RUST_LOG` still wins when set. Valid levels are: error, warn, info, debug, trace
pub fn init(log_level: &str) -> Result<()> {
    let env = Env::default()
        .filter_or("RUST_LOG", format!("repocast={}", parse_log_level(log_level)))
        .write_style_or("RUST_LOG_STYLE", "auto");

    Builder::from_env(env)
        .format(|buf, record| writeln!(buf, "{}", format_log(record)))
        .try_init()
        .map_err(|e| PipelineError::Config(format!("Logger already initialized: {}", e)))
}

/// Formats a log record as `[timestamp] LEVEL [stage] message`
///
/// The stage is the last segment of the module path, so pipeline logs read
/// `[cache]`, `[generator]`, `[orchestrator]` and so on.
pub fn format_log(record: &log::Record) -> String {
    let level = match record.level() {
        log::Level::Error => Paint::red("ERROR").bold(),
        log::Level::Warn => Paint::yellow("WARN ").bold(),
        log::Level::Info => Paint::cyan("INFO ").bold(),
        log::Level::Debug => Paint::blue("DEBUG").bold(),
        log::Level::Trace => Paint::new("TRACE"),
    };

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    format!(
        "[{}] {} [{}] {}",
        timestamp,
        level,
        stage_name(record.target()),
        record.args()
    )
}

fn stage_name(target: &str) -> &str {
    target.rsplit("::").next().filter(|s| !s.is_empty()).unwrap_or("repocast")
}

/// Parses a log level string into a LevelFilter
///
/// Returns the corresponding LevelFilter, defaulting to Info for invalid strings
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
