use std::env;
use std::path::PathBuf;

use crate::diagnostics::DiagnosticsMode;
use crate::error::{Error, Result};

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
const CONFIG_DIR_NAME: &str = "äh";
const CONFIG_FILE_NAME: &str = "config.yaml";
const HISTORY_FILE_NAME: &str = "history.json";

/// Which of the standard streams are attached to an interactive terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TerminalState {
    pub stdin: bool,
    pub stderr: bool,
}

impl TerminalState {
    pub fn detect() -> Self {
        use std::io::IsTerminal;

        Self {
            stdin: std::io::stdin().is_terminal(),
            stderr: std::io::stderr().is_terminal(),
        }
    }
}

/// Process-wide settings resolved once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub config_dir: PathBuf,
    pub diagnostics: DiagnosticsMode,
    pub spinner_enabled: bool,
    pub terminal: TerminalState,
}

impl Config {
    pub fn from_env(terminal: TerminalState) -> Self {
        Self::from_env_with(|key| env::var(key).ok(), terminal)
    }

    pub fn from_env_with(
        mut get_var: impl FnMut(&str) -> Option<String>,
        terminal: TerminalState,
    ) -> Self {
        let home = get_var("HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::home_dir);
        let config_dir = resolve_config_dir(
            get_var("AEH_CONFIG_DIR").as_deref(),
            get_var("XDG_CONFIG_HOME").as_deref(),
            home,
        );
        let no_color = get_var("NO_COLOR").is_some_and(|value| !value.is_empty());

        Self {
            api_key: get_var(API_KEY_VAR).filter(|value| !value.is_empty()),
            api_url: get_var("AEH_API_URL")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            request_timeout_secs: parse_positive_u64(
                get_var("AEH_TIMEOUT_SECS").as_deref(),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            config_dir,
            diagnostics: parse_diagnostics_mode(
                get_var("AEH_ERR").as_deref(),
                terminal.stderr,
                no_color,
            ),
            spinner_enabled: parse_bool(get_var("AEH_SPIN").as_deref(), terminal.stderr),
            terminal,
        }
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or(Error::MissingApiKey { var: API_KEY_VAR })
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    pub fn history_file_path(&self) -> PathBuf {
        self.config_dir.join(HISTORY_FILE_NAME)
    }
}

fn resolve_config_dir(
    explicit: Option<&str>,
    xdg_config_home: Option<&str>,
    home: Option<PathBuf>,
) -> PathBuf {
    if let Some(dir) = explicit.filter(|value| !value.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = xdg_config_home.filter(|value| !value.is_empty()) {
        return PathBuf::from(dir).join(CONFIG_DIR_NAME);
    }
    match home {
        Some(home) => home.join(".config").join(CONFIG_DIR_NAME),
        None => PathBuf::from(".").join(CONFIG_DIR_NAME),
    }
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn parse_diagnostics_mode(
    raw: Option<&str>,
    stderr_is_terminal: bool,
    no_color: bool,
) -> DiagnosticsMode {
    let requested = match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("0" | "false" | "no" | "off") => return DiagnosticsMode::Silent,
        Some("plain") => DiagnosticsMode::Plain,
        Some("1" | "true" | "yes" | "on" | "color") => DiagnosticsMode::Colored,
        _ if stderr_is_terminal => DiagnosticsMode::Colored,
        _ => DiagnosticsMode::Plain,
    };

    if no_color && requested == DiagnosticsMode::Colored {
        DiagnosticsMode::Plain
    } else {
        requested
    }
}
