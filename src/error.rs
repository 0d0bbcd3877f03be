use crate::wire::WireError;
use std::path::PathBuf;
use thiserror::Error;

/// Per-message failures. None of these ever leave a handler: each one is
/// logged and turned into a gap in that topic's index.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] WireError),

    #[error("cannot decode as '{encoding}': {reason}")]
    Decode { encoding: String, reason: String },

    #[error("fallback decode as '{encoding}' failed: {reason}")]
    FallbackDecode { encoding: String, reason: String },

    #[error("unsupported encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

impl HandlerError {
    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
