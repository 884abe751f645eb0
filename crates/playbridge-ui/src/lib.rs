// crates/playbridge-ui/src/lib.rs
//
// The control side of the bridge. A MediaElement lives on the egui thread,
// mirrors the engine's playback state into coerced, observable properties
// and turns pooled engine frames into a texture.

pub mod affinity;
pub mod config;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod helpers;
pub mod mirror;
pub mod pump;
pub mod surface;

pub use affinity::{Pending, ThreadAffinityContext};
pub use config::ElementConfig;
pub use dispatch::{DispatchPriority, Dispatcher};
pub use element::{FrameStats, MediaElement};
pub use error::{DispatchError, MirrorError};
pub use mirror::{ObserverId, PropertyValue, ReentrancyGuard, StateMirror, ViewEffects};
pub use pump::{FlushPump, RefreshTarget};
pub use surface::{LockedImage, TextureSurfaceFactory};
