//! Overlay rendering: colormap, blending, placeholder cells.

use image::{Rgb, RgbImage};

use crate::attribution::HostMap;
use crate::error::{ExplainError, Result};

/// Map a normalized value in [0, 1] to a jet-style heat color.
#[must_use]
pub fn jet_color(t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    [
        channel(1.5 - (4.0 * t - 3.0).abs()),
        channel(1.5 - (4.0 * t - 2.0).abs()),
        channel(1.5 - (4.0 * t - 1.0).abs()),
    ]
}

/// Blend a normalized attribution map onto the display image.
///
/// The map is colormapped at its native resolution, resized to the
/// display size, and blended as
/// `alpha * display + (1 - alpha) * heatmap` per channel. The blending
/// factor is fixed by the aggregator (0.7 by default).
pub fn overlay_mask(display: &RgbImage, map: &HostMap, alpha: f32) -> Result<RgbImage> {
    if map.values.len() != map.height * map.width {
        return Err(ExplainError::Computation(format!(
            "map has {} values for {}x{} shape",
            map.values.len(),
            map.height,
            map.width
        )));
    }
    if map.height == 0 || map.width == 0 {
        return Err(ExplainError::Computation("empty attribution map".into()));
    }

    let mut heat = RgbImage::new(map.width as u32, map.height as u32);
    for (y, row) in map.values.chunks(map.width).enumerate() {
        for (x, value) in row.iter().enumerate() {
            heat.put_pixel(x as u32, y as u32, Rgb(jet_color(*value)));
        }
    }

    let heat = image::imageops::resize(
        &heat,
        display.width(),
        display.height(),
        image::imageops::FilterType::Triangle,
    );

    let alpha = alpha.clamp(0.0, 1.0);
    let mut out = RgbImage::new(display.width(), display.height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let base = display.get_pixel(x, y).0;
        let overlay = heat.get_pixel(x, y).0;
        for c in 0..3 {
            let blended = alpha * f32::from(base[c]) + (1.0 - alpha) * f32::from(overlay[c]);
            pixel.0[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// The explicit "unavailable" cell rendered when a method fails.
#[must_use]
pub fn placeholder_cell(width: u32, height: u32) -> RgbImage {
    let mut cell = RgbImage::from_pixel(width, height, Rgb([48, 48, 48]));
    // Diagonal strike-through so the cell reads as intentionally empty.
    let steps = u64::from(width.max(height)).max(1);
    for i in 0..steps {
        let x = (u64::from(width.saturating_sub(1)) * i / steps) as u32;
        let y = (u64::from(height.saturating_sub(1)) * i / steps) as u32;
        cell.put_pixel(x, y, Rgb([96, 96, 96]));
    }
    cell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(jet_color(0.0)[0], 0); // cold end has no red
        assert_eq!(jet_color(1.0)[2], 0); // hot end has no blue
        assert_eq!(jet_color(0.5)[1], 255); // midpoint is green
    }

    #[test]
    fn test_jet_clamps_input() {
        assert_eq!(jet_color(-2.0), jet_color(0.0));
        assert_eq!(jet_color(2.0), jet_color(1.0));
    }

    #[test]
    fn test_overlay_preserves_display_size() {
        let display = RgbImage::from_pixel(20, 10, Rgb([100, 100, 100]));
        let map = HostMap {
            values: vec![0.5; 4],
            height: 2,
            width: 2,
        };

        let out = overlay_mask(&display, &map, 0.7).expect("overlay");
        assert_eq!((out.width(), out.height()), (20, 10));
    }

    #[test]
    fn test_overlay_alpha_one_is_identity() {
        let display = RgbImage::from_pixel(4, 4, Rgb([10, 200, 30]));
        let map = HostMap {
            values: vec![1.0; 16],
            height: 4,
            width: 4,
        };

        let out = overlay_mask(&display, &map, 1.0).expect("overlay");
        assert_eq!(out.get_pixel(2, 2).0, [10, 200, 30]);
    }

    #[test]
    fn test_overlay_rejects_shape_mismatch() {
        let display = RgbImage::new(4, 4);
        let map = HostMap {
            values: vec![0.0; 3],
            height: 2,
            width: 2,
        };
        assert!(overlay_mask(&display, &map, 0.7).is_err());
    }

    #[test]
    fn test_placeholder_dimensions() {
        let cell = placeholder_cell(8, 6);
        assert_eq!((cell.width(), cell.height()), (8, 6));
        assert_eq!(cell.get_pixel(1, 3).0, [48, 48, 48]);
    }
}
