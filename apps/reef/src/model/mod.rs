//! Value types shared by the compound tree, the frame orchestrator and
//! the wire protocol.

pub mod color_mask;
pub mod eye;
pub mod frustum;
pub mod geometry;
pub mod observer;
pub mod tasks;
pub mod view;

pub use color_mask::ColorMask;
pub use eye::{Eye, Eyes};
pub use frustum::{FrustumData, FrustumKind, Frustumf, Projection, Wall};
pub use geometry::{Pixel, PixelViewport, Range, SubPixel, Viewport, Zoom};
pub use observer::Observer;
pub use tasks::Tasks;
pub use view::{View, ViewKind};

/// Stereo rendering mode of a compound. Unset compounds inherit the
/// parent's mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StereoMode {
    /// Separate left/right draw buffers on a quad-buffered drawable.
    Quad,
    /// Both eyes share one buffer, separated by color masks.
    Anaglyph,
}
