// crates/playbridge-media/src/engine.rs
//
// The collaborator contracts the control consumes. Any engine that owns an
// EngineState, raises per-field change notifications through it and hands out
// pooled frames can sit behind a MediaElement.

use std::time::Duration;

use crossbeam_channel::Sender;

use playbridge_core::{DecodedFrame, EngineError, MediaEvent};

use crate::state::EngineState;

/// A playback engine. Every method is callable from any thread.
///
/// Transport methods fail fast with `EngineError::NoSession` when nothing is
/// open and with `EngineError::Disposed` after `dispose`.
pub trait MediaEngine: Send + Sync {
    /// The engine-owned playback state. Readers get copies; the control only
    /// writes the user-settable preferences through its coercion path.
    fn state(&self) -> &EngineState;

    fn is_disposed(&self) -> bool;

    /// Route session lifecycle events to `connector`. Replaces any previous one.
    fn attach_connector(&self, connector: std::sync::Arc<dyn MediaConnector>);

    fn open(&self, source: &str) -> Result<(), EngineError>;
    fn play(&self) -> Result<(), EngineError>;
    fn pause(&self) -> Result<(), EngineError>;
    fn stop(&self) -> Result<(), EngineError>;
    fn close(&self) -> Result<(), EngineError>;
    fn seek(&self, position: Duration) -> Result<(), EngineError>;

    /// Next decoded frame, if one is waiting. Never blocks.
    fn try_next_frame(&self) -> Option<DecodedFrame>;

    /// Return a frame's buffer to the producer. Call only after every copy out
    /// of the frame has completed.
    fn recycle_frame(&self, frame: DecodedFrame);

    /// Stop the engine's threads and release the session. Idempotent.
    fn dispose(&self);
}

/// Receives session lifecycle events. Called from engine threads.
pub trait MediaConnector: Send + Sync {
    fn notify(&self, event: MediaEvent);
}

/// Forwards events into a channel, for hosts that poll.
pub struct ChannelConnector(pub Sender<MediaEvent>);

impl MediaConnector for ChannelConnector {
    fn notify(&self, event: MediaEvent) {
        let _ = self.0.send(event);
    }
}
