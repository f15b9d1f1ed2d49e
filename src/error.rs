use std::path::PathBuf;

/// Error taxonomy for the object/reference/index core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a git repository (or any parent up to mount point): {0}")]
    InvalidRepository(PathBuf),

    #[error("missing: {0}")]
    Missing(String),

    #[error("corrupt: {0}")]
    Corrupt(String),

    #[error("malformed object: {0}")]
    MalformedObject(String),

    #[error("reference resolution cycle detected starting at {0}")]
    CycleDetected(String),

    #[error("reference chain exceeds depth cap starting at {0}")]
    TooDeep(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("path outside work tree: {0}")]
    PathOutsideWorkTree(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown mandatory index extension: {0}")]
    UnknownExtension(String),
}

pub type Result<T> = std::result::Result<T, Error>;
