//! Encoded image fixtures

use std::io::Cursor;

use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, ImageFormat, Rgba, RgbaImage};
use shoal_core::{ShoalError, ShoalResult};

fn encode_err(e: image::ImageError) -> ShoalError {
    ShoalError::Decode(format!("fixture encode: {e}"))
}

/// Animated GIF whose frames carry `delays_ms` as their own durations.
///
/// Decoding yields cumulative timestamps: `[100, 150]` becomes `[100, 250]`.
pub fn gif_bytes(delays_ms: &[u32]) -> ShoalResult<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        let frames = delays_ms.iter().enumerate().map(|(i, &ms)| {
            let shade = (i as u8).wrapping_mul(40);
            Frame::from_parts(
                RgbaImage::from_pixel(4, 4, Rgba([shade, 80, 160, 255])),
                0,
                0,
                Delay::from_numer_denom_ms(ms, 1),
            )
        });
        encoder.encode_frames(frames).map_err(encode_err)?;
    }
    Ok(buf)
}

/// Opaque PNG of the given size
pub fn png_bytes(width: u32, height: u32) -> ShoalResult<Vec<u8>> {
    let img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).map_err(encode_err)?;
    Ok(out.into_inner())
}
