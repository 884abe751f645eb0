// crates/playbridge-media/src/lib.rs
//
// Engine side of the bridge. No egui dependency; talks to playbridge-ui
// through EngineState notifications and the frame channel only.
//
// To add a new kind of source:
//   1. Implement MediaSource in a new module here
//   2. Register its URI scheme in SourceRegistry::with_defaults

pub mod changes;
pub mod engine;
pub mod pool;
pub mod source;
pub mod state;
pub mod worker;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use changes::{ChangeProducer, ChangeQueue};
pub use engine::{ChannelConnector, MediaConnector, MediaEngine};
pub use pool::FramePool;
pub use source::{MediaSource, SourceOpener, SourceRegistry, TestPatternSource};
pub use state::{EngineState, SubscriptionId};
pub use worker::{EngineConfig, PlaybackEngine};
