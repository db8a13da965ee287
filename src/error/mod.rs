use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort a benchmark session.
///
/// Integrity mismatches are not errors: they are recorded on the sample and
/// reported, so the session can keep going.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to split command line: {0}")]
    CommandParse(String),

    #[error("unable to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed, retval({code}): {command}")]
    CommandFailed { code: i32, command: String },

    #[error("invalid timing value {value:?} in '{path}'")]
    TimeParse { path: PathBuf, value: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unable to parse config '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unable to serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Unable to find file: '{0}'")]
    FileNotFound(String),

    #[error("unsupported test tool '{0}', expected minigzip or minideflate")]
    UnsupportedTool(String),

    #[error("source file '{0}' is empty, cannot generate testfiles")]
    EmptySource(PathBuf),

    #[error("unable to serialize results: {0}")]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        BenchError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
