// crates/playbridge-ui/src/error.rs

use thiserror::Error;

use playbridge_core::PlaybackProperty;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatcher has shut down")]
    ShutDown,
    #[error("must be called on the owner thread")]
    WrongThread,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MirrorError {
    #[error("unknown property '{0}'")]
    UnknownProperty(String),
    #[error("property {0} is read-only")]
    ReadOnly(PlaybackProperty),
    #[error("property {property} expects a {expected} value, got {actual}")]
    TypeMismatch {
        property: PlaybackProperty,
        expected: &'static str,
        actual:   &'static str,
    },
}
