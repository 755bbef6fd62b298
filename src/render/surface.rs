//! Off-screen mount point for layouts awaiting capture.
//!
//! A layout is only paintable while mounted. Mounting returns a guard that
//! detaches on drop, so every exit path (success, `?`, panic unwind) leaves
//! the surface as it found it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::layout::Layout;

/// Far outside any visible viewport.
pub const OFFSCREEN_ORIGIN: (f32, f32) = (-9999.0, 0.0);

#[derive(Debug, Default)]
pub struct RenderSurface {
    next_id: AtomicU64,
    // (mount id, node count)
    mounted: Mutex<Vec<(u64, usize)>>,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `layout` and return a guard that owns it until drop.
    pub fn mount(&self, layout: Layout) -> MountGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let nodes = layout.node_count();
        self.lock().push((id, nodes));
        tracing::trace!(mount_id = id, nodes, "Layout mounted off-screen");
        MountGuard { surface: self, id, layout }
    }

    /// Nodes currently attached across all mounts.
    pub fn node_count(&self) -> usize {
        self.lock().iter().map(|(_, n)| n).sum()
    }

    pub fn mounted_layouts(&self) -> usize {
        self.lock().len()
    }

    fn detach(&self, id: u64) {
        self.lock().retain(|(m, _)| *m != id);
        tracing::trace!(mount_id = id, "Layout detached");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, usize)>> {
        // A poisoned list is still a valid list
        self.mounted.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A mounted layout. Detaches from its surface on drop.
pub struct MountGuard<'s> {
    surface: &'s RenderSurface,
    id: u64,
    layout: Layout,
}

impl MountGuard<'_> {
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn origin(&self) -> (f32, f32) {
        OFFSCREEN_ORIGIN
    }
}

impl std::ops::Deref for MountGuard<'_> {
    type Target = Layout;

    fn deref(&self) -> &Layout {
        &self.layout
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        self.surface.detach(self.id);
    }
}
