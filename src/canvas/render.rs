use thiserror::Error;

use super::{BLANK, Color};
use crate::error::StoreError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load pixels: {0}")]
    Store(#[from] StoreError),

    #[error("failed to encode png: {0}")]
    Encode(#[from] png::EncodingError),

    #[error("render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Encodes a `size` x `size` RGB PNG: blank background, then `pixels`.
///
/// Output depends only on the set of pixels, not on their order, so the same
/// canvas state always yields identical bytes. Out-of-range points are
/// skipped.
pub fn render_png(
    size: u32,
    pixels: impl IntoIterator<Item = (u32, u32, Color)>,
) -> Result<Vec<u8>, png::EncodingError> {
    let side = size as usize;
    let mut data = vec![0u8; side * side * 3];
    for px in data.chunks_exact_mut(3) {
        px.copy_from_slice(&[BLANK.r, BLANK.g, BLANK.b]);
    }

    for (x, y, color) in pixels {
        if x >= size || y >= size {
            continue;
        }
        let at = (y as usize * side + x as usize) * 3;
        data[at..at + 3].copy_from_slice(&[color.r, color.g, color.b]);
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, size, size);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&data)?;
        writer.finish()?;
    }
    Ok(out)
}
