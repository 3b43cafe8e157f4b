use std::fmt::Display;
use std::io::{self, Write};

use console::Style;

/// How human-facing diagnostics are written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticsMode {
    Colored,
    Plain,
    Silent,
}

impl DiagnosticsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Colored => "colored",
            Self::Plain => "plain",
            Self::Silent => "silent",
        }
    }
}

/// Stderr printer for everything that is not the answer itself.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    mode: DiagnosticsMode,
    style: Style,
}

impl Diagnostics {
    pub fn new(mode: DiagnosticsMode) -> Self {
        // The mode was already decided from the terminal, so styling is forced
        // rather than re-detected by console.
        let style = Style::new().yellow().force_styling(true);
        Self { mode, style }
    }

    pub fn render(&self, message: impl Display) -> Option<String> {
        match self.mode {
            DiagnosticsMode::Colored => Some(self.style.apply_to(message).to_string()),
            DiagnosticsMode::Plain => Some(message.to_string()),
            DiagnosticsMode::Silent => None,
        }
    }

    /// Writes one line.
    pub fn emit(&self, message: impl Display) {
        if let Some(line) = self.render(message) {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }

    /// Writes a block verbatim (raw HTTP dumps); never styled.
    pub fn emit_raw(&self, block: &str) {
        if self.mode == DiagnosticsMode::Silent {
            return;
        }
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(block.as_bytes());
        if !block.ends_with('\n') {
            let _ = stderr.write_all(b"\n");
        }
        let _ = stderr.flush();
    }
}
