//! Screenshot post-processing: pointer marker and the placeholder image.

use std::io::Cursor;
use std::sync::OnceLock;

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use proto::ActionError;

const MARKER_BOX: u32 = 20;
const MARKER_RADIUS: i64 = 5;
const MARKER_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Draws a red dot at `(x, y)` on a PNG screenshot.
///
/// The dot sits in the centre of a 20x20 box whose top-left corner is
/// `(x - 10, y - 10)` clamped to the image origin.
pub fn mark_point(png: &[u8], x: f64, y: f64) -> Result<Vec<u8>, ActionError> {
    let mut canvas = image::load_from_memory(png)
        .map_err(|e| ActionError::Page(format!("Failed to decode screenshot: {e}")))?
        .to_rgba8();

    let half = i64::from(MARKER_BOX / 2);
    let left = (x.round() as i64 - half).max(0);
    let top = (y.round() as i64 - half).max(0);
    let (width, height) = canvas.dimensions();

    for dy in 0..i64::from(MARKER_BOX) {
        for dx in 0..i64::from(MARKER_BOX) {
            let (ox, oy) = (dx - half, dy - half);
            if ox * ox + oy * oy > MARKER_RADIUS * MARKER_RADIUS {
                continue;
            }
            let (px, py) = (left + dx, top + dy);
            if px < i64::from(width) && py < i64::from(height) {
                canvas.put_pixel(px as u32, py as u32, MARKER_COLOR);
            }
        }
    }

    encode_png(canvas)
}

/// Fixed image returned when an action fails hard.
pub fn placeholder_png() -> &'static [u8] {
    static PLACEHOLDER: OnceLock<Vec<u8>> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        let (width, height) = (320_u32, 200_u32);
        let canvas = RgbaImage::from_fn(width, height, |px, py| {
            // Red cross on grey.
            let on_diagonal = (px * height).abs_diff(py * width) < width * 3
                || (px * height).abs_diff((height - 1 - py) * width) < width * 3;
            if on_diagonal {
                MARKER_COLOR
            } else {
                Rgba([224, 224, 224, 255])
            }
        });
        encode_png(canvas).unwrap_or_default()
    })
}

fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>, ActionError> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut out, ImageOutputFormat::Png)
        .map_err(|e| ActionError::Page(format!("Failed to encode screenshot: {e}")))?;
    Ok(out.into_inner())
}

#[cfg(test)]
pub(crate) fn blank_png(width: u32, height: u32) -> Vec<u8> {
    let canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    encode_png(canvas).expect("encode blank png")
}
