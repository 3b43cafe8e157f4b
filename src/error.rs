use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used for reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    Config,
    Transport,
    Protocol,
    Shape,
    Interrupted,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Message is already rendered for the terminal (reason plus help or usage).
    #[error("{0}")]
    Usage(String),

    #[error("{var} environment variable not set")]
    MissingApiKey { var: &'static str },

    #[error("config dir '{}' exists but is not a directory", .path.display())]
    ConfigDirNotDirectory { path: PathBuf },

    #[error(
        "config file '{}' exists but is a directory; please remove that directory, as it is where the config file needs to go",
        .path.display()
    )]
    ConfigFileIsDirectory { path: PathBuf },

    #[error("error {action} '{}'", .path.display())]
    ConfigIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error parsing config file '{}'", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("error serializing default config to YAML")]
    ConfigSerialize(#[source] serde_yaml::Error),

    #[error("error {action} history file '{}'", .path.display())]
    History {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error serializing history entry to JSON")]
    HistorySerialize(#[source] serde_json::Error),

    #[error("{0}")]
    Transport(String),

    #[error("received non-success HTTP status code ({status})")]
    Protocol { status: u16 },

    #[error("response is not of expected shape ({reason})")]
    Shape { reason: String },

    #[error("received signal {signal}")]
    Interrupted { signal: &'static str },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage(_) => ErrorKind::Usage,
            Self::MissingApiKey { .. }
            | Self::ConfigDirNotDirectory { .. }
            | Self::ConfigFileIsDirectory { .. }
            | Self::ConfigIo { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigSerialize(_)
            | Self::History { .. }
            | Self::HistorySerialize(_) => ErrorKind::Config,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Shape { .. } => ErrorKind::Shape,
            Self::Interrupted { .. } => ErrorKind::Interrupted,
        }
    }
}
