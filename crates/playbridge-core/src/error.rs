// crates/playbridge-core/src/error.rs
//
// Typed engine failures. These bubble to whoever issued the command; the
// bridge itself never retries.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no media session is open")]
    NoSession,
    #[error("media engine has been disposed")]
    Disposed,
    #[error("a source is already being opened")]
    Busy,
    #[error("failed to open '{source_uri}': {reason}")]
    Open { source_uri: String, reason: String },
    #[error("no source handler for '{0}'")]
    UnsupportedSource(String),
    #[error("media is not seekable")]
    NotSeekable,
    #[error("source read failed: {0}")]
    Read(String),
    #[error("playback thread is gone")]
    WorkerGone,
}

impl EngineError {
    pub fn open(source_uri: impl Into<String>, reason: impl ToString) -> Self {
        EngineError::Open { source_uri: source_uri.into(), reason: reason.to_string() }
    }
}
