use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid interface name {name:?}")]
    InvalidInterfaceName { name: String },

    #[error("joining net namespace {path:?}: {source}")]
    Namespace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("short write: sent {written} of {expected} serialised bytes")]
    ShortWrite { written: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
