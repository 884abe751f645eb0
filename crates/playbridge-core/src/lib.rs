// crates/playbridge-core/src/lib.rs
//
// Plain data shared by the engine side (playbridge-media) and the control
// side (playbridge-ui). No threads, no GUI.

pub mod commands;
pub mod error;
pub mod frame;
pub mod helpers;
pub mod media_types;
pub mod state;

pub use commands::MediaCommand;
pub use error::EngineError;
pub use frame::{Bitmap, BitmapFactory, FrameBufferView, FrameError, PixelFormat, SurfaceDesc, SurfaceFactory, WritableSurface};
pub use media_types::{DecodedFrame, MediaEvent, MediaInfo};
pub use state::{
    CaptionsChannel, MediaPlaybackState, PlaybackProperty, PlaybackState, PropertySet, Stretch,
    StretchDirection,
};
