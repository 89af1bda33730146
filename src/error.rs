//! Error types shared by every filter and the pipeline engine.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors a filter can report while running.
///
/// A pipeline run surfaces at most one of these: the first one recorded
/// by any of its stages.
#[derive(Error, Debug)]
pub enum FilterError {
    /// A pattern handed to a regex-based filter did not compile.
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    /// A filter was constructed with arguments it cannot run with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Opening or reading a named file failed.
    #[error("{}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// An external program could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An external program exited unsuccessfully.
    #[error("'{program}' failed: {status}")]
    CommandFailed { program: String, status: ExitStatus },

    /// Every reader of a stage's output went away.
    #[error("output channel closed")]
    ChannelClosed,

    /// Pipeline text could not be parsed.
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl FilterError {
    /// Build an `InvalidArgument` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        FilterError::InvalidArgument(message.into())
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
