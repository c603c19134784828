pub mod controller;
pub mod events;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod surface;

pub use controller::{PlaybackController, SessionError};
pub use events::{ProgressSample, SessionEvent, SessionEventHandle};
pub use service::{PlaybackService, SessionCommand, SessionHandle};
pub use state::{
    BandwidthSwitchMode, BitrateSelection, MediaDescriptor, Phase, PlayMode, SessionRequest,
    SessionSnapshot, StreamRequestMode,
};
pub use surface::{RenderTarget, SurfaceKind};
