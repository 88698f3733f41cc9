use thiserror::Error;

// Internal error taxonomy. None of these are fatal and none of them cross
// the public API, every call site absorbs the error, logs it, and
// degrades gracefully rather than propagating a failure to the caller.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("http transfer error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed etag record at line {line}")]
    EtagParse { line: usize },

    #[error("inconsistent hash length: expected {expected}, got {got}")]
    InconsistentHashLength { expected: usize, got: usize },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
