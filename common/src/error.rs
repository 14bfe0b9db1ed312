use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while reducing raw benchmark output.
///
/// The per-file variants ([`Error::EmptyInput`], [`Error::MalformedInput`],
/// [`Error::MissingIodepth`], [`Error::Io`]) exclude a single shard from its
/// run. [`Error::DivisionByZero`] and [`Error::InvalidInput`] mean the sample
/// accounting of a run is broken and abort that run only.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{} is empty", path.display())]
    EmptyInput { path: PathBuf },
    #[error("{} could not be parsed: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },
    #[error("no iodepth in {} or its path", path.display())]
    MissingIodepth { path: PathBuf },
    #[error("combined weight is zero")]
    DivisionByZero,
    #[error("invalid statistics input: {0}")]
    InvalidInput(String),
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no reader registered for {0}")]
    UnknownReader(String),
}

impl Error {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::MalformedInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the variants that only invalidate the file they came from.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Error::EmptyInput { .. }
                | Error::MalformedInput { .. }
                | Error::MissingIodepth { .. }
                | Error::Io { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
