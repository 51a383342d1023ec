use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A line matched one of the combat templates but a numeric field could not be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed {field} field: {value:?}")]
    MalformedField { field: &'static str, value: String },
}

impl ParseError {
    pub fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            value: value.into(),
        }
    }
}

/// Failures while following the log files. All of them are transient: the
/// tracker keeps its state and the next poll tries again.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("log directory {0:?} does not exist")]
    DirectoryMissing(PathBuf),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TrackerError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings i/o: {0}")]
    Io(#[from] io::Error),

    #[error("settings json: {0}")]
    Json(#[from] serde_json::Error),
}
