use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Truncated table: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid table header: {0}")]
    InvalidHeader(&'static str),
}
