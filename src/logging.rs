use std::env;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::config_store::private_dir_builder;
use crate::diagnostics::DiagnosticsMode;

const DEFAULT_LOG_FILTER: &str = "warn";
const DEFAULT_LOG_FORMAT: &str = "pretty";
const DEFAULT_LOG_OUTPUT: &str = "stderr";
const DEFAULT_LOG_FILE_NAME: &str = "aeh.log";

static LOG_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogOutput {
    Stderr,
    File,
    Both,
}

fn parse_log_format(raw: Option<&str>) -> LogFormat {
    match raw
        .unwrap_or(DEFAULT_LOG_FORMAT)
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

fn parse_log_output(raw: Option<&str>) -> LogOutput {
    match raw
        .unwrap_or(DEFAULT_LOG_OUTPUT)
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "file" => LogOutput::File,
        "both" => LogOutput::Both,
        _ => LogOutput::Stderr,
    }
}

/// Explicit path, or `<config dir>/logs/aeh.log`.
fn parse_log_file_path(raw: Option<&str>, config_dir: &Path) -> PathBuf {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.join("logs").join(DEFAULT_LOG_FILE_NAME))
}

fn build_file_writer(path: &Path) -> std::io::Result<(non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| std::ffi::OsStr::new(DEFAULT_LOG_FILE_NAME));

    // The default log dir sits inside the config dir; whichever is created
    // first must already be private.
    private_dir_builder().create(dir)?;
    let appender = tracing_appender::rolling::daily(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Silent diagnostics also silence logging unless `RUST_LOG` asks for it.
fn default_filter(mode: DiagnosticsMode) -> &'static str {
    match mode {
        DiagnosticsMode::Silent => "off",
        DiagnosticsMode::Colored | DiagnosticsMode::Plain => DEFAULT_LOG_FILTER,
    }
}

fn env_filter_from_env(mode: DiagnosticsMode) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(mode)))
}

/// ANSI escapes only on a stderr-only subscriber in colored mode; files never get them.
fn use_ansi(mode: DiagnosticsMode, output: LogOutput) -> bool {
    mode == DiagnosticsMode::Colored && output == LogOutput::Stderr
}

fn stderr_writer() -> BoxMakeWriter {
    BoxMakeWriter::new(std::io::stderr)
}

#[derive(Clone, Copy, Debug)]
struct Layout {
    format: LogFormat,
    mode: DiagnosticsMode,
}

impl Layout {
    fn install(self, output: LogOutput, writer: BoxMakeWriter) -> InitResult {
        let ansi = use_ansi(self.mode, output);
        let env_filter = env_filter_from_env(self.mode);
        match self.format {
            LogFormat::Pretty => tracing_subscriber::fmt()
                .with_ansi(ansi)
                .with_env_filter(env_filter)
                .with_writer(writer)
                .try_init(),
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_ansi(ansi)
                .with_env_filter(env_filter)
                .with_writer(writer)
                .try_init(),
        }
    }
}

fn init_file_output(layout: Layout, output: LogOutput, file_path: &Path) -> InitResult {
    let include_stderr = output == LogOutput::Both;
    match build_file_writer(file_path) {
        Ok((file_writer, guard)) => {
            let writer = if include_stderr {
                BoxMakeWriter::new(std::io::stderr.and(file_writer))
            } else {
                BoxMakeWriter::new(file_writer)
            };

            let init_result = layout.install(output, writer);
            if init_result.is_ok()
                && let Ok(mut slot) = LOG_GUARD.lock()
            {
                *slot = Some(guard);
            }
            init_result
        }
        Err(err) => {
            if layout.mode != DiagnosticsMode::Silent {
                let (name, fallback) = if include_stderr {
                    ("both", "using stderr only")
                } else {
                    ("file", "using stderr instead")
                };
                eprintln!(
                    "aeh: failed to initialize AEH_LOG_OUTPUT={} at '{}': {}; {}",
                    name,
                    file_path.display(),
                    err,
                    fallback
                );
            }
            layout.install(LogOutput::Stderr, stderr_writer())
        }
    }
}

/// Installs the global subscriber. Filtering follows `RUST_LOG`; with no
/// filter set only warnings are shown, and nothing at all in silent mode.
/// Color follows the diagnostics mode so `AEH_ERR` and `NO_COLOR` apply here too.
pub fn init(config_dir: &Path, mode: DiagnosticsMode) {
    let layout = Layout {
        format: parse_log_format(env::var("AEH_LOG_FORMAT").ok().as_deref()),
        mode,
    };
    let output = parse_log_output(env::var("AEH_LOG_OUTPUT").ok().as_deref());
    let file_path = parse_log_file_path(env::var("AEH_LOG_FILE").ok().as_deref(), config_dir);

    let init_result = match output {
        LogOutput::Stderr => layout.install(output, stderr_writer()),
        LogOutput::File | LogOutput::Both => init_file_output(layout, output, &file_path),
    };

    let _ = init_result;
}

/// Flushes buffered file output. Call once, right before the process exits.
pub fn shutdown() {
    if let Ok(mut slot) = LOG_GUARD.lock() {
        slot.take();
    }
}
