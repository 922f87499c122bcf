//! Logging bootstrap and the progress sink contract.
//!
//! # Responsibility
//! - Initialize file-based rolling logs exactly once per process.
//! - Define [`LogSink`], the single-method progress writer that long
//!   operations (import, revalidation) report through.
//!
//! # Invariants
//! - Logging init is idempotent for the same level and directory.
//! - Re-initialization with a different level or directory is rejected.
//! - Logging initialization must not panic.
//! - Log events carry identifiers and counts, never entry content.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "lexdb";
const SUMMARY_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Settings for the rolling file logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory the `lexdb*.log` files are written to.
    pub log_dir: String,
    /// Size at which the active file is rotated.
    pub rotate_bytes: u64,
    /// Rotated files kept besides the active one.
    pub keep_files: usize,
    /// Records at or above this level are also written to stderr.
    pub echo_stderr: LevelFilter,
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>, log_dir: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            log_dir: log_dir.into(),
            rotate_bytes: 10 * 1024 * 1024,
            keep_files: 5,
            echo_stderr: LevelFilter::Warn,
        }
    }
}

struct ActiveLogger {
    level: &'static str,
    log_dir: PathBuf,
    handle: LoggerHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDirectory(String),
    /// Logging is already active with a different level or directory.
    Conflict { active: String, requested: String },
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(message) => write!(f, "{message}"),
            Self::Conflict { active, requested } => write!(
                f,
                "logging already initialized with {active}; refusing to switch to {requested}"
            ),
            Self::Backend(message) => write!(f, "failed to start logger: {message}"),
        }
    }
}

impl Error for LoggingError {}

/// Starts rolling file logs under `log_dir` at `level` with default limits.
///
/// # Errors
/// See [`init_logging_with`].
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), LoggingError> {
    init_logging_with(&LoggingConfig::new(level, log_dir))
}

/// Starts the process-wide logger once; later calls must repeat the same
/// level and directory.
///
/// # Errors
/// - `UnsupportedLevel` for an unknown level name.
/// - `InvalidDirectory` when the directory is blank, relative or cannot be
///   created.
/// - `Conflict` when logging already runs with another level or directory.
pub fn init_logging_with(config: &LoggingConfig) -> Result<(), LoggingError> {
    let level = parse_level(&config.level)?;
    let log_dir = absolute_dir(&config.log_dir)?;

    let active = ACTIVE.get_or_try_init(|| start(config, level, &log_dir))?;
    if active.log_dir != log_dir {
        return Err(LoggingError::Conflict {
            active: format!("directory `{}`", active.log_dir.display()),
            requested: format!("`{}`", log_dir.display()),
        });
    }
    if active.level != level {
        return Err(LoggingError::Conflict {
            active: format!("level `{}`", active.level),
            requested: format!("`{level}`"),
        });
    }
    Ok(())
}

/// Active `(level, log_dir)`, or `None` before initialization.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.level, active.log_dir.clone()))
}

/// Writes buffered records to the active log file. No-op before
/// initialization.
pub fn flush_logs() {
    if let Some(active) = ACTIVE.get() {
        active.handle.flush();
    }
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start(
    config: &LoggingConfig,
    level: &'static str,
    log_dir: &Path,
) -> Result<ActiveLogger, LoggingError> {
    if let Err(err) = std::fs::create_dir_all(log_dir) {
        return Err(LoggingError::InvalidDirectory(format!(
            "cannot create log directory `{}`: {err}",
            log_dir.display()
        )));
    }

    let files = FileSpec::default()
        .directory(log_dir)
        .basename(LOG_FILE_BASENAME);
    let handle = Logger::try_with_str(level)
        .and_then(|logger| {
            logger
                .log_to_file(files)
                .rotate(
                    Criterion::Size(config.rotate_bytes),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(config.keep_files),
                )
                .duplicate_to_stderr(stderr_echo(config.echo_stderr))
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
                .start()
        })
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    PANIC_HOOK.get_or_init(install_panic_hook);
    info!(
        "event=logging_init module=logging status=ok level={} log_dir={} version={}",
        level,
        log_dir.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        level,
        log_dir: log_dir.to_path_buf(),
        handle,
    })
}

fn stderr_echo(level: LevelFilter) -> Duplicate {
    match level {
        LevelFilter::Off => Duplicate::None,
        LevelFilter::Error => Duplicate::Error,
        LevelFilter::Warn => Duplicate::Warn,
        LevelFilter::Info => Duplicate::Info,
        LevelFilter::Debug => Duplicate::Debug,
        LevelFilter::Trace => Duplicate::Trace,
    }
}

fn parse_level(level: &str) -> Result<&'static str, LoggingError> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    let wanted = level.trim().to_ascii_lowercase();
    let wanted = if wanted == "warning" { "warn".to_string() } else { wanted };
    LEVELS
        .into_iter()
        .find(|known| *known == wanted)
        .ok_or(LoggingError::UnsupportedLevel(wanted))
}

fn absolute_dir(log_dir: &str) -> Result<PathBuf, LoggingError> {
    let path = PathBuf::from(log_dir.trim());
    if path.as_os_str().is_empty() {
        return Err(LoggingError::InvalidDirectory(
            "log directory cannot be blank".to_string(),
        ));
    }
    if path.is_relative() {
        return Err(LoggingError::InvalidDirectory(format!(
            "log directory must be absolute, got `{}`",
            path.display()
        )));
    }
    Ok(path)
}

/// Chains a hook that records the panic site before the previous hook runs.
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let site = info.location().map_or_else(
            || "unknown".to_string(),
            |location| format!("{}:{}", location.file(), location.line()),
        );
        error!(
            "event=panic module=logging status=error location={} payload={}",
            site,
            panic_summary(info)
        );
        previous(info);
    }));
}

fn panic_summary(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    let text = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string payload>");
    sanitize_message(text, SUMMARY_CHARS)
}

/// One-line form of `value`, cut after `max_chars` characters.
pub(crate) fn sanitize_message(value: &str, max_chars: usize) -> String {
    let mut line: String = value
        .chars()
        .map(|c| if matches!(c, '\n' | '\r') { ' ' } else { c })
        .take(max_chars)
        .collect();
    if value.chars().nth(max_chars).is_some() {
        line.push_str("...");
    }
    line
}

/// Single-method progress writer.
///
/// The engine never depends on a concrete sink; callers pick where progress
/// lines go.
pub trait LogSink: Send + Sync {
    fn write(&self, message: &str);
}

/// Writes each message as one line on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write(&self, message: &str) {
        let _ = write_line(std::io::stderr().lock(), message);
    }
}

/// Writes each message as one line on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, message: &str) {
        let _ = write_line(std::io::stdout().lock(), message);
    }
}

fn write_line(mut out: impl Write, message: &str) -> std::io::Result<()> {
    writeln!(out, "{message}")?;
    out.flush()
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl LogSink for SilentSink {
    fn write(&self, _message: &str) {}
}

/// Forwards messages to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn write(&self, message: &str) {
        info!(
            "event=progress module=logging status=ok message={}",
            sanitize_message(message, SUMMARY_CHARS)
        );
    }
}

impl<S: LogSink + ?Sized> LogSink for &S {
    fn write(&self, message: &str) {
        (**self).write(message);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        absolute_dir, default_log_level, flush_logs, init_logging, init_logging_with,
        logging_status, parse_level, sanitize_message, write_line, FacadeSink, LogSink,
        LoggingConfig, LoggingError, SilentSink, StderrSink, StdoutSink,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl LogSink for Recorder {
        fn write(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("DEBUG").unwrap(), "debug");
        assert_eq!(parse_level(" Warning ").unwrap(), "warn");
        assert_eq!(
            parse_level("verbose"),
            Err(LoggingError::UnsupportedLevel("verbose".to_string()))
        );
    }

    #[test]
    fn log_directory_must_be_absolute() {
        assert!(matches!(
            absolute_dir("   "),
            Err(LoggingError::InvalidDirectory(_))
        ));
        let err = absolute_dir("var/log/lexdb").unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn messages_are_flattened_to_one_line() {
        assert_eq!(sanitize_message("kanin\nk a n i: n", 40), "kanin k a n i: n");
        assert_eq!(sanitize_message("abcdefgh", 3), "abc...");
        assert_eq!(sanitize_message("abc", 3), "abc");
    }

    #[test]
    fn sinks_are_usable_through_references() {
        fn report(sink: impl LogSink) {
            sink.write("imported 10 entries");
        }

        let recorder = Recorder::default();
        report(&recorder);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["imported 10 entries".to_string()]
        );
    }

    #[test]
    fn default_level_is_accepted_by_init() {
        assert!(parse_level(default_log_level()).is_ok());
    }

    #[test]
    fn stream_sinks_write_one_line_per_message() {
        let mut out = Vec::new();
        write_line(&mut out, "imported 2 entries into sv").unwrap();
        write_line(&mut out, "imported 4 entries into sv").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "imported 2 entries into sv\nimported 4 entries into sv\n"
        );

        StdoutSink.write("stdout sink");
        StderrSink.write("stderr sink");
        SilentSink.write("dropped");
    }

    // Owns the process-wide logger for this test binary; other tests must not
    // initialize logging.
    #[test]
    fn second_init_must_repeat_the_active_settings() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap().to_string();
        let other_str = other.path().to_str().unwrap().to_string();

        let config = LoggingConfig {
            keep_files: 2,
            ..LoggingConfig::new("info", dir_str.clone())
        };
        init_logging_with(&config).unwrap();
        init_logging("info", &dir_str).unwrap();

        assert!(matches!(
            init_logging("debug", &dir_str),
            Err(LoggingError::Conflict { .. })
        ));
        let err = init_logging("info", &other_str).unwrap_err();
        assert!(err.to_string().contains("refusing to switch"));

        let (level, active_dir) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(active_dir, dir.path());

        FacadeSink.write("revalidated\n12 entries");
        flush_logs();
        let logged: String = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|file| std::fs::read_to_string(file.unwrap().path()).unwrap_or_default())
            .collect();
        assert!(logged.contains("event=progress module=logging status=ok message=revalidated 12 entries"));
    }
}
