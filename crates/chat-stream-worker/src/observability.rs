use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Library events at `info`, everything else only at `warn`.
pub const DEFAULT_FILTER: &str = "warn,chat_stream_worker=info";

const DEFAULT_JSON_FILE: &str = "chat-stream.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

/// Where log records go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogOutput {
    /// Compact human-readable lines on stderr. Stdout is left to the
    /// application, which usually prints the streamed text there.
    Console,
    /// One JSON object per line appended to this file. Every record carries
    /// the enclosing `task` span, so lines can be grouped by `task_id`.
    JsonFile(PathBuf),
}

/// Subscriber settings, normally read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// `EnvFilter` directive string.
    pub filter: String,
    pub output: LogOutput,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: DEFAULT_FILTER.to_string(),
            output: LogOutput::Console,
        }
    }
}

impl LogSettings {
    /// Reads settings from the process environment.
    ///
    /// - `CHAT_STREAM_OBSERVABILITY_ENABLED`: `false`/`0`/`off` disables logging.
    /// - `CHAT_STREAM_LOG_LEVEL`: filter directive; a bare level such as `debug`
    ///   applies to this crate only.
    /// - `RUST_LOG`: full filter directive, used when the above is unset.
    /// - `CHAT_STREAM_JSON_LOG_PATH`: switch to JSON lines in this file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut settings = Self::default();
        let enabled = var("CHAT_STREAM_OBSERVABILITY_ENABLED").and_then(|v| parse_flag(&v));
        if let Some(flag) = enabled {
            settings.enabled = flag;
        }
        if let Some(level) = var("CHAT_STREAM_LOG_LEVEL") {
            settings.filter = crate_filter(&level);
        } else if let Some(directive) = var("RUST_LOG") {
            settings.filter = directive;
        }
        if let Some(path) = var("CHAT_STREAM_JSON_LOG_PATH") {
            settings.output = LogOutput::JsonFile(PathBuf::from(path));
        }
        settings
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Scopes a bare level to this crate; full directives pass through.
fn crate_filter(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("warn,chat_stream_worker={level}")
    }
}

/// Splits a log file path into the directory and file name the appender wants.
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_FILE)
        .to_string();
    (dir, file)
}

/// Installs a global subscriber from [`LogSettings::from_env`], once per process.
///
/// The library only emits events; applications opt in by calling this.
pub fn init_observability() {
    init_with(LogSettings::from_env());
}

/// Installs a global subscriber from explicit settings. Only the first call in
/// a process has any effect, and an already-installed foreign subscriber wins.
pub fn init_with(settings: LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        let filter = settings.env_filter();
        match &settings.output {
            LogOutput::JsonFile(path) => {
                let (dir, file) = split_log_path(path);
                let _ = std::fs::create_dir_all(&dir);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(tracing_appender::rolling::never(dir, file));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            LogOutput::Console => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}
