//! Frame types on either side of hydration

use shoal_core::TextureHandle;

/// Decoded RGBA frame, owned and immutable once produced.
///
/// `timestamp_ms` is the presentation end time of the frame measured from
/// the start of the animation, so a frame's display delay is its
/// timestamp minus the previous frame's.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub timestamp_ms: u32,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, timestamp_ms: u32) -> Self {
        RawFrame {
            width,
            height,
            pixels,
            timestamp_ms,
        }
    }

    /// Size of the pixel buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

/// Frame living on the render surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HydratedFrame {
    pub texture: TextureHandle,
    pub timestamp_ms: u32,
}
