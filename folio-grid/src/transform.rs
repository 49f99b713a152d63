//! Pan/zoom of an image inside a fixed-size cell.
//!
//! The image always covers the container on any axis where it is larger, and
//! sits centered on any axis where it is smaller:
//!
//! ```text
//!   scaled >= container            scaled < container
//!   ┌─────────────────────┐        ┌───────────┐
//!   │ image               │        │ container │
//!   │   ┌───────────┐     │        │  ┌─────┐  │
//!   │   │ container │     │        │  │image│  │  offset = (c - s) / 2
//!   │   └───────────┘     │        │  └─────┘  │
//!   └─────────────────────┘        └───────────┘
//!   offset ∈ [c - s, 0]
//! ```
//!
//! [`ImageFrame`] holds the per-cell interaction state: a drag session only
//! previews; [`ImageFrame::end_drag`] and [`ImageFrame::set_scale`] produce
//! the [`TransformCommit`] that the editor persists.

use folio_core::{MAX_SCALE, MIN_SCALE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub w: f32,
    pub h: f32,
}

impl Size {
    pub fn new(w: f32, h: f32) -> Self {
        Self { w, h }
    }

    fn scaled(self, scale: f32) -> Self {
        Self {
            w: self.w * scale,
            h: self.h * scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Slider range for image scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformLimits {
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
        }
    }
}

impl TransformLimits {
    /// Non-finite input falls back to 1.0 before clamping.
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        let scale = if scale.is_finite() { scale } else { 1.0 };
        scale.clamp(self.min_scale, self.max_scale)
    }
}

// ───────────────────────────────────────────────────────────────────
// Pure clamping
// ───────────────────────────────────────────────────────────────────

/// Clamp one axis of the offset.
#[inline]
pub fn clamp_axis(offset: f32, container: f32, scaled: f32) -> f32 {
    if scaled < container {
        return (container - scaled) / 2.0;
    }
    let offset = if offset.is_finite() { offset } else { 0.0 };
    offset.clamp((container - scaled).min(0.0), 0.0)
}

/// Clamp `offset` for an image of `natural` size drawn at `scale` inside
/// `container`.
pub fn clamp(container: Size, natural: Size, offset: Offset, scale: f32) -> Offset {
    let scaled = natural.scaled(scale);
    Offset {
        x: clamp_axis(offset.x, container.w, scaled.w),
        y: clamp_axis(offset.y, container.h, scaled.h),
    }
}

/// Smallest scale at which the image covers the container, within `limits`.
pub fn scale_to_cover(container: Size, natural: Size, limits: &TransformLimits) -> f32 {
    if natural.w <= 0.0 || natural.h <= 0.0 {
        return limits.clamp_scale(1.0);
    }
    limits.clamp_scale((container.w / natural.w).max(container.h / natural.h))
}

// ───────────────────────────────────────────────────────────────────
// ImageFrame: per-cell interaction state
// ───────────────────────────────────────────────────────────────────

/// Offset and scale to persist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformCommit {
    pub offset: Offset,
    pub scale: f32,
}

#[derive(Debug, Clone, Copy)]
struct DragSession {
    last_pointer: Offset,
}

#[derive(Debug, Clone)]
pub struct ImageFrame {
    container: Option<Size>,
    natural: Option<Size>,
    offset: Offset,
    scale: f32,
    drag: Option<DragSession>,
    uploading: bool,
    limits: TransformLimits,
}

impl ImageFrame {
    pub fn new(offset: Offset, scale: f32, limits: TransformLimits) -> Self {
        Self {
            container: None,
            natural: None,
            offset,
            scale: limits.clamp_scale(scale),
            drag: None,
            uploading: false,
            limits,
        }
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn natural(&self) -> Option<Size> {
        self.natural
    }

    pub fn container(&self) -> Option<Size> {
        self.container
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    fn bounds(&self) -> Option<(Size, Size)> {
        Some((self.container?, self.natural?))
    }

    /// Clamp `offset` at the current scale; `None` until both sizes are known.
    pub fn clamp(&self, offset: Offset) -> Option<Offset> {
        let (container, natural) = self.bounds()?;
        Some(clamp(container, natural, offset, self.scale))
    }

    pub fn set_container(&mut self, container: Size) {
        self.container = Some(container);
        self.reclamp();
    }

    /// Natural size is read once when the image finishes loading.
    pub fn image_loaded(&mut self, natural: Size) {
        self.natural = Some(natural);
        self.reclamp();
    }

    fn reclamp(&mut self) {
        if let Some(offset) = self.clamp(self.offset) {
            self.offset = offset;
        }
    }

    pub fn set_uploading(&mut self, uploading: bool) {
        self.uploading = uploading;
        if uploading {
            self.drag = None;
        }
    }

    /// Start a drag at `pointer`. Refused while uploading or before the
    /// image size is known.
    pub fn begin_drag(&mut self, pointer: Offset) -> bool {
        if self.uploading || self.bounds().is_none() {
            return false;
        }
        self.drag = Some(DragSession {
            last_pointer: pointer,
        });
        true
    }

    /// Apply the pointer delta since the last event. Returns the clamped
    /// preview offset; nothing is committed.
    pub fn drag_to(&mut self, pointer: Offset) -> Option<Offset> {
        let last = self.drag.as_ref()?.last_pointer;
        let proposed = Offset {
            x: self.offset.x + (pointer.x - last.x),
            y: self.offset.y + (pointer.y - last.y),
        };
        let clamped = self.clamp(proposed)?;
        self.offset = clamped;
        if let Some(drag) = self.drag.as_mut() {
            drag.last_pointer = pointer;
        }
        Some(clamped)
    }

    /// Finish the drag at `pointer` and produce the commit.
    pub fn end_drag(&mut self, pointer: Offset) -> Option<TransformCommit> {
        self.drag_to(pointer)?;
        self.drag = None;
        Some(TransformCommit {
            offset: self.clamp(self.offset)?,
            scale: self.scale,
        })
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    /// New scale from the slider; re-clamps the offset and commits both.
    pub fn set_scale(&mut self, scale: f32) -> Option<TransformCommit> {
        let (container, natural) = self.bounds()?;
        self.scale = self.limits.clamp_scale(scale);
        self.offset = clamp(container, natural, self.offset, self.scale);
        Some(TransformCommit {
            offset: self.offset,
            scale: self.scale,
        })
    }

    /// Scale to the smallest cover-fit and commit.
    pub fn fit(&mut self) -> Option<TransformCommit> {
        let (container, natural) = self.bounds()?;
        self.set_scale(scale_to_cover(container, natural, &self.limits))
    }
}
