// SPDX-License-Identifier: CEPL-1.0
//! Window collaborator: `winit` plus the size bookkeeping the renderer needs.

pub use winit;

use prism_render::RenderSize;
use tracing::debug;
use winit::dpi::PhysicalSize;
use winit::window::Window;

pub fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

/// Current drawable area in physical pixels. Zero while minimised.
pub fn drawable_size(window: &Window) -> RenderSize {
    render_size(window.inner_size())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeKind {
    Unchanged,
    Minimized,
    Restored,
    Changed,
}

pub fn classify_resize(previous: RenderSize, next: RenderSize) -> ResizeKind {
    let kind = match (previous.is_empty(), next.is_empty()) {
        (_, true) if previous == next => ResizeKind::Unchanged,
        (_, true) => ResizeKind::Minimized,
        (true, false) => ResizeKind::Restored,
        (false, false) if previous == next => ResizeKind::Unchanged,
        (false, false) => ResizeKind::Changed,
    };
    debug!(
        target: "prism::platform",
        from = ?(previous.width, previous.height),
        to = ?(next.width, next.height),
        ?kind,
        "resize"
    );
    kind
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimise_then_restore() {
        let full = RenderSize::new(800, 600);
        let zero = RenderSize::new(0, 0);
        assert_eq!(classify_resize(full, zero), ResizeKind::Minimized);
        assert_eq!(classify_resize(zero, zero), ResizeKind::Unchanged);
        assert_eq!(classify_resize(zero, full), ResizeKind::Restored);
    }

    #[test]
    fn one_zero_axis_counts_as_minimised() {
        let full = RenderSize::new(800, 600);
        assert_eq!(classify_resize(full, RenderSize::new(800, 0)), ResizeKind::Minimized);
    }

    #[test]
    fn same_size_is_unchanged() {
        let s = RenderSize::new(640, 480);
        assert_eq!(classify_resize(s, s), ResizeKind::Unchanged);
        assert_eq!(classify_resize(s, RenderSize::new(641, 480)), ResizeKind::Changed);
    }

    #[test]
    fn physical_size_maps_through() {
        assert_eq!(render_size(PhysicalSize::new(3, 4)), RenderSize::new(3, 4));
    }
}
