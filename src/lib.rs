// Library exports for integration tests and reusable components

pub mod config;
pub mod engine;
pub mod playback;
pub mod store;

pub use config::Config;
pub use engine::{EngineError, EngineEvent, EngineEventSink, EngineFactory, PlayerEngine};
pub use playback::{PlaybackService, SessionError, SessionHandle};
pub use store::{FileProgressStore, MemoryProgressStore, ProgressStore};

// Test support (unit tests, or integration tests with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
