use std::path::PathBuf;

use thiserror::Error;

/// Everything that can make a build fail, per the kinds in the design
/// document. Every component returns `Result<_, BuildError>`; the driver
/// unwinds immediately on the first error and does not retry.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("bad source directory '{path}': {reason}")]
    BadSource { path: PathBuf, reason: String },

    #[error("bad target: {0}")]
    BadTarget(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compression error: {0}")]
    Compression(String),

    #[error("node too large to encode: {actual} bytes (limit {limit})")]
    Encoding { actual: usize, limit: usize },

    #[error("{count} hard links to '{path}' were counted but never emitted")]
    LinkAccount { path: PathBuf, count: u32 },

    #[error("max_leb_cnt too low: {needed} LEBs needed, {max} allowed")]
    Capacity { needed: u32, max: u32 },

    #[error("file '{path}' changed size while being read (expected {expected}, read {actual})")]
    ImageChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
