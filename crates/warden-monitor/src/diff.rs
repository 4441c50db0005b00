//! Template/tile comparison.
//!
//! Template pixel `(tx, ty)` lands on tile pixel `(tx + offset.x, ty + offset.y)`.
//! Pixels that land outside the tile are ignored, as are fully transparent
//! template pixels, which mark "don't care" areas of the template.

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use warden_types::{Coordinate, ErrorPixelSet, PixelOffset};

use crate::error::MonitorResult;

/// Compare `template` against `tile` and return the mismatched tile coordinates.
pub fn compare(template: &RgbaImage, tile: &RgbaImage, offset: PixelOffset) -> ErrorPixelSet {
    let (tile_width, tile_height) = tile.dimensions();
    let mut mismatches = ErrorPixelSet::new();

    for (tx, ty, expected) in template.enumerate_pixels() {
        if expected.0[3] == 0 {
            continue;
        }
        let Some(remote) = map_to_tile(tx, ty, offset, tile_width, tile_height) else {
            continue;
        };
        if tile.get_pixel(remote.x, remote.y) != expected {
            mismatches.insert(remote);
        }
    }

    mismatches
}

/// Cut the template's footprint out of the tile.
///
/// The result always has the template's dimensions; parts of the footprint
/// that fall outside the tile are transparent.
pub fn crop_to_template(tile: &RgbaImage, template: &RgbaImage, offset: PixelOffset) -> RgbaImage {
    let (tile_width, tile_height) = tile.dimensions();
    let (width, height) = template.dimensions();

    RgbaImage::from_fn(width, height, |x, y| {
        match map_to_tile(x, y, offset, tile_width, tile_height) {
            Some(remote) => *tile.get_pixel(remote.x, remote.y),
            None => Rgba([0, 0, 0, 0]),
        }
    })
}

/// Encode a bitmap as PNG.
pub fn encode_png(image: &RgbaImage) -> MonitorResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

fn map_to_tile(
    x: u32,
    y: u32,
    offset: PixelOffset,
    tile_width: u32,
    tile_height: u32,
) -> Option<Coordinate> {
    let rx = i64::from(x).checked_add(offset.x)?;
    let ry = i64::from(y).checked_add(offset.y)?;
    let rx = u32::try_from(rx).ok().filter(|&rx| rx < tile_width)?;
    let ry = u32::try_from(ry).ok().filter(|&ry| ry < tile_height)?;
    Some(Coordinate::new(rx, ry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn solid(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(width, height, color)
    }

    #[test]
    fn test_identical_images_have_no_mismatches() {
        let template = solid(2, 2, RED);
        let tile = solid(2, 2, RED);

        assert!(compare(&template, &tile, PixelOffset::default()).is_empty());
    }

    #[test]
    fn test_single_changed_pixel() {
        let template = solid(2, 2, RED);
        let mut tile = solid(2, 2, RED);
        tile.put_pixel(1, 1, BLUE);

        let mismatches = compare(&template, &tile, PixelOffset::default());
        assert_eq!(mismatches.sorted(), vec![Coordinate::new(1, 1)]);
    }

    #[test]
    fn test_transparent_template_pixel_ignored() {
        let mut template = solid(2, 2, RED);
        template.put_pixel(0, 0, Rgba([255, 0, 0, 0]));
        let mut tile = solid(2, 2, RED);
        tile.put_pixel(0, 0, BLUE);

        assert!(compare(&template, &tile, PixelOffset::default()).is_empty());
    }

    #[test]
    fn test_alpha_difference_is_a_mismatch() {
        let template = solid(1, 1, RED);
        let tile = solid(1, 1, Rgba([255, 0, 0, 128]));

        assert_eq!(compare(&template, &tile, PixelOffset::default()).len(), 1);
    }

    #[test]
    fn test_offset_maps_into_tile_coordinates() {
        let template = solid(2, 2, RED);
        let mut tile = solid(10, 10, RED);
        tile.put_pixel(6, 4, BLUE);

        let mismatches = compare(&template, &tile, PixelOffset::new(5, 3));
        assert_eq!(mismatches.sorted(), vec![Coordinate::new(6, 4)]);
    }

    #[test]
    fn test_out_of_range_pixels_skipped() {
        let template = solid(4, 4, RED);
        let tile = solid(3, 3, BLUE);

        let mismatches = compare(&template, &tile, PixelOffset::new(-2, 1));
        // Only template columns 2..4 and rows 0..2 land inside the tile.
        assert_eq!(
            mismatches.sorted(),
            vec![
                Coordinate::new(0, 1),
                Coordinate::new(0, 2),
                Coordinate::new(1, 1),
                Coordinate::new(1, 2),
            ]
        );

        let far_away = compare(&template, &tile, PixelOffset::new(i64::MAX, i64::MIN));
        assert!(far_away.is_empty());
    }

    #[test]
    fn test_crop_pads_outside_tile() {
        let template = solid(3, 2, RED);
        let mut tile = solid(4, 4, BLUE);
        tile.put_pixel(3, 2, RED);

        let cropped = crop_to_template(&tile, &template, PixelOffset::new(2, 2));
        assert_eq!(cropped.dimensions(), (3, 2));
        assert_eq!(*cropped.get_pixel(0, 0), BLUE);
        assert_eq!(*cropped.get_pixel(1, 0), RED);
        assert_eq!(*cropped.get_pixel(2, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*cropped.get_pixel(0, 1), BLUE);
    }

    #[test]
    fn test_encode_png_roundtrip_dimensions() {
        let bytes = encode_png(&solid(5, 3, RED)).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (5, 3));
        assert_eq!(*decoded.get_pixel(4, 2), RED);
    }

    fn build(width: u32, height: u32, pixels: &[[u8; 4]]) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba(pixels[(y * width + x) as usize]))
    }

    fn image_strategy() -> impl Strategy<Value = RgbaImage> {
        (1u32..7, 1u32..7, prop::collection::vec(prop::array::uniform4(0u8..2), 36))
            .prop_map(|(width, height, pixels)| build(width, height, &pixels))
    }

    proptest! {
        #[test]
        fn prop_mismatches_respect_bounds_and_transparency(
            template in image_strategy(),
            tile in image_strategy(),
            dx in -8i64..8,
            dy in -8i64..8,
        ) {
            let offset = PixelOffset::new(dx, dy);
            let mismatches = compare(&template, &tile, offset);

            for c in mismatches.iter() {
                prop_assert!(c.x < tile.width() && c.y < tile.height());
                let tx = i64::from(c.x) - dx;
                let ty = i64::from(c.y) - dy;
                prop_assert!(tx >= 0 && ty >= 0);
                let expected = template.get_pixel(tx as u32, ty as u32);
                prop_assert_ne!(expected.0[3], 0);
                prop_assert_ne!(expected, tile.get_pixel(c.x, c.y));
            }
        }

        #[test]
        fn prop_compare_is_deterministic(
            template in image_strategy(),
            tile in image_strategy(),
            dx in -8i64..8,
            dy in -8i64..8,
        ) {
            let offset = PixelOffset::new(dx, dy);
            prop_assert_eq!(compare(&template, &tile, offset), compare(&template, &tile, offset));
        }
    }
}
