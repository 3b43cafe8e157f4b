use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config_store::{ensure_private_dir, private_file_options};
use crate::error::{Error, Result};

/// One prompt/response pair, stored as a single JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "Prompt")]
    pub prompt: String,
    #[serde(rename = "Response")]
    pub response: String,
}

/// Append-only JSON-lines log. Never read back or rotated by the program.
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, prompt: &str, response: &str) -> Result<()> {
        let entry = HistoryEntry {
            prompt: prompt.to_string(),
            response: response.to_string(),
        };
        let mut line = serde_json::to_vec(&entry).map_err(Error::HistorySerialize)?;
        line.push(b'\n');

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            ensure_private_dir(dir)?;
        }

        let mut file = private_file_options()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|source| self.error("opening", source))?;
        file.write_all(&line)
            .map_err(|source| self.error("writing to", source))?;
        file.sync_data()
            .map_err(|source| self.error("syncing", source))?;

        debug!(
            path = %self.path.display(),
            bytes = line.len(),
            "appended history entry"
        );
        Ok(())
    }

    fn error(&self, action: &'static str, source: std::io::Error) -> Error {
        Error::History {
            action,
            path: self.path.clone(),
            source,
        }
    }
}
