//! Render target attachment, tracked independently of the session phase.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Render target type, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceKind {
    SurfaceView,
    TextureView,
}

/// Platform drawable the engine renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub kind: SurfaceKind,
    /// Opaque platform handle
    pub handle: u64,
    pub width: u32,
    pub height: u32,
}

/// Edge emitted by the binding; each one maps to exactly one controller callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceTransition {
    Attached,
    Detached,
}

/// Platform surface lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Available(RenderTarget),
    Resized { width: u32, height: u32 },
    Destroyed,
}

#[derive(Debug, Clone)]
pub struct SurfaceBinding {
    kind: SurfaceKind,
    target: Option<RenderTarget>,
}

impl SurfaceBinding {
    pub fn new(kind: SurfaceKind) -> Self {
        Self { kind, target: None }
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn is_attached(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    /// Record a surface becoming available.
    ///
    /// Repeated availability without an intervening destroy is a no-op, as is a
    /// target of the wrong kind.
    pub fn on_available(&mut self, target: RenderTarget) -> Option<SurfaceTransition> {
        if target.kind != self.kind {
            warn!(
                "Ignoring {:?} render target, binding is configured for {:?}",
                target.kind, self.kind
            );
            return None;
        }

        if self.target.is_some() {
            debug!("Surface already attached, ignoring duplicate availability");
            return None;
        }

        self.target = Some(target);
        Some(SurfaceTransition::Attached)
    }

    pub fn on_destroyed(&mut self) -> Option<SurfaceTransition> {
        self.target.take().map(|_| SurfaceTransition::Detached)
    }

    /// Returns false if there is no attached target to resize
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        match self.target.as_mut() {
            Some(target) => {
                target.width = width;
                target.height = height;
                true
            }
            None => false,
        }
    }

    /// Fresh binding for a new attempt, inheriting the live platform surface
    pub fn carry_over(&self) -> SurfaceBinding {
        SurfaceBinding {
            kind: self.kind,
            target: self.target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(handle: u64) -> RenderTarget {
        RenderTarget {
            kind: SurfaceKind::SurfaceView,
            handle,
            width: 1920,
            height: 1080,
        }
    }

    #[test]
    fn duplicate_availability_attaches_once() {
        let mut binding = SurfaceBinding::new(SurfaceKind::SurfaceView);

        assert_eq!(binding.on_available(target(1)), Some(SurfaceTransition::Attached));
        assert_eq!(binding.on_available(target(1)), None);
        assert!(binding.is_attached());
    }

    #[test]
    fn destroy_is_edge_triggered() {
        let mut binding = SurfaceBinding::new(SurfaceKind::SurfaceView);
        assert_eq!(binding.on_destroyed(), None);

        binding.on_available(target(1));
        assert_eq!(binding.on_destroyed(), Some(SurfaceTransition::Detached));
        assert_eq!(binding.on_destroyed(), None);
        assert_eq!(binding.on_available(target(2)), Some(SurfaceTransition::Attached));
        assert_eq!(binding.target().map(|t| t.handle), Some(2));
    }

    #[test]
    fn wrong_kind_is_ignored() {
        let mut binding = SurfaceBinding::new(SurfaceKind::TextureView);

        assert_eq!(binding.on_available(target(1)), None);
        assert!(!binding.is_attached());
    }

    #[test]
    fn resize_requires_target() {
        let mut binding = SurfaceBinding::new(SurfaceKind::SurfaceView);
        assert!(!binding.resize(640, 480));

        binding.on_available(target(1));
        assert!(binding.resize(640, 480));
        assert_eq!(binding.target().map(|t| (t.width, t.height)), Some((640, 480)));
    }

    #[test]
    fn carry_over_keeps_live_surface() {
        let mut binding = SurfaceBinding::new(SurfaceKind::SurfaceView);
        binding.on_available(target(9));

        let next = binding.carry_over();
        assert!(next.is_attached());
        assert_eq!(next.kind(), SurfaceKind::SurfaceView);
    }
}
