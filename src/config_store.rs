//! The on-disk YAML config file holding per-user defaults.
//!
//! ```yaml
//! defaults:
//!   model: gpt-3.5-turbo
//!   temp: 0.7
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub defaults: Option<DefaultsSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
}

/// Defaults after every missing field has been filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub model: String,
    pub temperature: f64,
}

impl ConfigFile {
    pub fn with_defaults() -> Self {
        let mut file = Self::default();
        file.fill_missing();
        file
    }

    pub fn parse(raw: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn fill_missing(&mut self) {
        let defaults = self.defaults.get_or_insert_with(DefaultsSection::default);
        if defaults.model.is_none() {
            defaults.model = Some(DEFAULT_MODEL.to_string());
        }
        if defaults.temp.is_none() {
            defaults.temp = Some(DEFAULT_TEMPERATURE);
        }
    }

    pub fn resolve(mut self) -> Defaults {
        self.fill_missing();
        let section = self.defaults.unwrap_or_default();
        Defaults {
            model: section.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: section.temp.unwrap_or(DEFAULT_TEMPERATURE),
        }
    }
}

pub struct ConfigStore {
    dir: PathBuf,
    file: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>, file: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file: file.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn ensure_dir(&self) -> Result<()> {
        ensure_private_dir(&self.dir)
    }

    /// Creates the directory and a default-populated file on first run.
    /// Returns `true` when the file was written by this call.
    pub fn ensure_exists(&self, diagnostics: &Diagnostics) -> Result<bool> {
        self.ensure_dir()?;

        match fs::metadata(&self.file) {
            Ok(meta) if meta.is_dir() => Err(Error::ConfigFileIsDirectory {
                path: self.file.clone(),
            }),
            Ok(_) => Ok(false),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                diagnostics.emit(
                    "the config did not yet exist, so I am creating a default-config in this file for you to start with...",
                );
                self.write_defaults()?;
                diagnostics.emit(format!(
                    "filled default config at '{}'",
                    self.file.display()
                ));
                info!(path = %self.file.display(), "created default config file");
                Ok(true)
            }
            Err(source) => Err(Error::ConfigIo {
                action: "inspecting config file",
                path: self.file.clone(),
                source,
            }),
        }
    }

    pub fn load(&self) -> Result<Defaults> {
        let raw = fs::read_to_string(&self.file).map_err(|source| Error::ConfigIo {
            action: "reading config file",
            path: self.file.clone(),
            source,
        })?;
        let parsed = ConfigFile::parse(&raw).map_err(|source| Error::ConfigParse {
            path: self.file.clone(),
            source,
        })?;
        let defaults = parsed.resolve();
        debug!(
            path = %self.file.display(),
            model = %defaults.model,
            temperature = defaults.temperature,
            "loaded config file"
        );
        Ok(defaults)
    }

    fn write_defaults(&self) -> Result<()> {
        let yaml =
            serde_yaml::to_string(&ConfigFile::with_defaults()).map_err(Error::ConfigSerialize)?;
        let io_err = |source: io::Error| Error::ConfigIo {
            action: "writing default config file",
            path: self.file.clone(),
            source,
        };

        let mut file = private_file_options()
            .write(true)
            .create_new(true)
            .open(&self.file)
            .map_err(io_err)?;
        file.write_all(yaml.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)
    }
}

/// Creates `dir` (owner-only on unix) unless it already exists as a directory.
pub(crate) fn ensure_private_dir(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::ConfigDirNotDirectory {
            path: dir.to_path_buf(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            private_dir_builder()
                .create(dir)
                .map_err(|source| Error::ConfigIo {
                    action: "creating config dir",
                    path: dir.to_path_buf(),
                    source,
                })
        }
        Err(source) => Err(Error::ConfigIo {
            action: "inspecting config dir",
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Recursive, and owner-only on unix for every directory it creates.
pub(crate) fn private_dir_builder() -> fs::DirBuilder {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
}

pub(crate) fn private_file_options() -> fs::OpenOptions {
    #[allow(unused_mut)]
    let mut options = fs::OpenOptions::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}
