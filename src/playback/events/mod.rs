pub mod handle;

use crate::playback::state::Phase;
pub use handle::SessionEventHandle;

/// One periodic progress sample taken from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub position_millis: u64,
    pub buffered_millis: u64,
    pub bandwidth_bps: u64,
    pub bitrate: u32,
}

/// Presentation events emitted by a playback session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged {
        phase: Phase,
    },
    BufferingUpdate {
        percent: u8,
    },
    BufferingFinished,
    /// Play/pause button state
    PlayStateChanged {
        playing: bool,
    },
    Progress(ProgressSample),
    Prepared {
        item_id: String,
        name: String,
        duration_millis: u64,
    },
    ResolutionChanged {
        width: u32,
        height: u32,
    },
    Completed,
    Error {
        code: i32,
        extra: i32,
        message: String,
    },
    CloseRequested,
    ItemChanged {
        index: usize,
        item_id: String,
    },
}
