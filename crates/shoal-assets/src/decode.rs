//! Safe decode boundary
//!
//! Runs on a worker thread. Everything returned is an owned buffer; no
//! decoder state or borrowed memory escapes.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, Frames, ImageDecoder, ImageFormat, ImageReader, Limits};
use shoal_core::{ShoalError, ShoalResult};

use crate::RawFrame;

/// Largest accepted canvas edge, in pixels
pub const MAX_DIMENSION: u32 = 4096;

/// Largest decoder allocation, in bytes
pub const MAX_ALLOC: u64 = 256 * 1024 * 1024;

/// Decoder limits applied to every remote image
pub fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DIMENSION);
    limits.max_image_height = Some(MAX_DIMENSION);
    limits.max_alloc = Some(MAX_ALLOC);
    limits
}

fn decode_err(e: image::ImageError) -> ShoalError {
    ShoalError::Decode(e.to_string())
}

/// Decode an animated (or still) image into timed RGBA frames.
///
/// An unrecognised or corrupt container yields an empty sequence. If the
/// container breaks partway through, the frames decoded so far are kept.
pub fn decode_animation(bytes: &[u8]) -> Vec<RawFrame> {
    match try_decode_animation(bytes, decode_limits()) {
        Ok(frames) => frames,
        Err(e) => {
            tracing::warn!(error = %e, len = bytes.len(), "animation decode failed");
            Vec::new()
        }
    }
}

fn try_decode_animation(bytes: &[u8], limits: Limits) -> ShoalResult<Vec<RawFrame>> {
    let format = image::guess_format(bytes).map_err(decode_err)?;
    match format {
        ImageFormat::WebP => {
            let mut decoder = WebPDecoder::new(Cursor::new(bytes)).map_err(decode_err)?;
            decoder.set_limits(limits.clone()).map_err(decode_err)?;
            if decoder.has_animation() {
                Ok(collect_timed(decoder.into_frames()))
            } else {
                decode_still_limited(bytes, limits).map(|f| vec![f])
            }
        }
        ImageFormat::Gif => {
            let mut decoder = GifDecoder::new(Cursor::new(bytes)).map_err(decode_err)?;
            decoder.set_limits(limits).map_err(decode_err)?;
            Ok(collect_timed(decoder.into_frames()))
        }
        _ => decode_still_limited(bytes, limits).map(|f| vec![f]),
    }
}

fn collect_timed(frames: Frames<'_>) -> Vec<RawFrame> {
    let mut out = Vec::new();
    let mut timestamp_ms = 0u32;

    for frame in frames {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, decoded = out.len(), "animation truncated");
                break;
            }
        };
        let (numer, denom) = frame.delay().numer_denom_ms();
        let delay_ms = if denom == 0 { 0 } else { numer / denom };
        timestamp_ms = timestamp_ms.saturating_add(delay_ms);

        let buffer = frame.into_buffer();
        let (width, height) = buffer.dimensions();
        out.push(RawFrame::new(width, height, buffer.into_raw(), timestamp_ms));
    }
    out
}

/// Decode a single still image (the representational image)
pub fn decode_still(bytes: &[u8]) -> ShoalResult<RawFrame> {
    decode_still_limited(bytes, decode_limits())
}

fn decode_still_limited(bytes: &[u8], limits: Limits) -> ShoalResult<RawFrame> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ShoalError::Decode(e.to_string()))?;
    reader.limits(limits);
    let image = reader.decode().map_err(decode_err)?;
    let rgba = image.into_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(RawFrame::new(width, height, rgba.into_raw(), 0))
}
